//! Transcoder configuration

/// Placeholder replaced by the source URL in the argument template
pub const URL_PLACEHOLDER: &str = "{url}";

/// Default transcoder binary for this platform
pub fn default_binary() -> String {
    if cfg!(windows) {
        "./ffmpeg.exe".to_string()
    } else {
        "ffmpeg".to_string()
    }
}

/// How to invoke the external transcoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderConfig {
    /// Path or name of the transcoder binary
    pub binary: String,

    /// Argument template; every `{url}` is replaced by the source URL
    pub args: Vec<String>,

    /// Forward transcoder stderr to ours (otherwise discarded)
    pub inherit_stderr: bool,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            // ffmpeg -i <url> -f mp3 -
            args: ["-i", URL_PLACEHOLDER, "-f", "mp3", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            inherit_stderr: true,
        }
    }
}

impl TranscoderConfig {
    /// Create a config for a specific binary with the default arguments
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    /// Replace the argument template
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Discard transcoder stderr
    pub fn quiet(mut self) -> Self {
        self.inherit_stderr = false;
        self
    }

    /// Expand the argument template for a source URL
    pub fn args_for(&self, source_url: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(URL_PLACEHOLDER, source_url))
            .collect()
    }
}
