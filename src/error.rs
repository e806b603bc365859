use thiserror::Error;

/// All failure modes of the patching pipeline.
///
/// `AlreadyApplied` is a control-flow signal rather than a true error: the
/// executors raise it to report that the target already contains the patch's
/// changes, and [`crate::patcher::Patcher`] converts it into a soft success.
#[derive(Error, Debug)]
pub enum PatchError {
    /// An external tool is missing or its probe invocation failed.
    #[error("{message}")]
    CommandNotFound { command: String, message: String },

    /// A local path or remote resource could not be located.
    #[error("{message}")]
    PathNotFound { path: String, message: String },

    #[error("the path \"{path}\" is not readable")]
    PathNotReadable { path: String },

    #[error("the path \"{path}\" is not writable")]
    PathNotWritable { path: String },

    #[error("the path \"{path}\" could not be created")]
    PathNotCreated { path: String },

    /// A package declared a malformed patch configuration.
    #[error("invalid configuration of package {package} ({key}): {reason}")]
    InvalidConfig {
        package: String,
        key: String,
        reason: String,
    },

    /// The external tool ran but reported that the patch did not apply.
    #[error("{message}")]
    NotApplied {
        patch: String,
        from_package: String,
        message: String,
    },

    /// The target already reflects the patch's changes. Not a true error.
    #[error("the patch \"{patch}\" provided by \"{from_package}\" was already applied")]
    AlreadyApplied { patch: String, from_package: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON from {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The process for an external command could not be spawned or collected.
    #[error("failed to run {command}: {source}")]
    Process {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    pub fn command_not_found(command: impl Into<String>, detail: Option<String>) -> Self {
        let command = command.into();
        let message = match detail {
            Some(detail) if !detail.trim().is_empty() => detail,
            _ => format!("Unable to find the command \"{command}\"."),
        };
        PatchError::CommandNotFound { command, message }
    }

    pub fn path_not_found(path: impl Into<String>, detail: Option<String>) -> Self {
        let path = path.into();
        let message = match detail {
            Some(detail) if !detail.trim().is_empty() => detail,
            _ => format!("Unable to find the path \"{path}\"."),
        };
        PatchError::PathNotFound { path, message }
    }

    pub fn not_applied(patch: &crate::patch::Patch, reason: &str) -> Self {
        let mut message = format!(
            "Unable to apply the patch \"{}\" provided by \"{}\"",
            patch.description(),
            patch.from_package()
        );
        let reason = reason.trim();
        if reason.is_empty() {
            message.push('.');
        } else {
            message.push_str(": ");
            message.push_str(reason);
        }
        PatchError::NotApplied {
            patch: patch.description().to_string(),
            from_package: patch.from_package().to_string(),
            message,
        }
    }

    pub fn already_applied(patch: &crate::patch::Patch) -> Self {
        PatchError::AlreadyApplied {
            patch: patch.description().to_string(),
            from_package: patch.from_package().to_string(),
        }
    }

    pub fn invalid_config(
        package: &crate::host::Package,
        key: &str,
        reason: impl Into<String>,
    ) -> Self {
        PatchError::InvalidConfig {
            package: package.name().to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// True for outcomes that terminate a level-retry loop immediately.
    pub fn is_already_applied(&self) -> bool {
        matches!(self, PatchError::AlreadyApplied { .. })
    }
}
