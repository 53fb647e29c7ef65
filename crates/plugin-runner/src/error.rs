use polld_core::InvocationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginRunError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse plugin output line: {source}\n  line: {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("plugin output is not valid UTF-8\n  line: {line}")]
    InvalidUtf8 { line: String },

    #[error("invalid notification: {reason}\n  line: {line}")]
    InvalidNotification { line: String, reason: String },

    #[error("profile '{0}' requires confinement but no sandbox launcher is configured")]
    NoLauncher(String),

    #[error("process error: {0}")]
    Process(String),
}

impl From<PluginRunError> for InvocationError {
    fn from(e: PluginRunError) -> Self {
        match e {
            PluginRunError::Io(e) => InvocationError::Io(e.to_string()),
            PluginRunError::Spawn { .. } | PluginRunError::NoLauncher(_) => {
                InvocationError::Spawn(e.to_string())
            }
            PluginRunError::Parse { line, source } => InvocationError::MalformedOutput {
                line,
                reason: source.to_string(),
            },
            PluginRunError::InvalidUtf8 { line } => InvocationError::MalformedOutput {
                line,
                reason: "output is not valid UTF-8".into(),
            },
            PluginRunError::InvalidNotification { line, reason } => {
                InvocationError::MalformedOutput { line, reason }
            }
            PluginRunError::Process(msg) => InvocationError::Io(msg),
        }
    }
}
