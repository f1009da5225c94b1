#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Media class an entry is dispatched to by the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    Video,
    Image,
    Album,
    SelfText,
}

impl MediaClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaClass::Video => "video",
            MediaClass::Image => "image",
            MediaClass::Album => "album",
            MediaClass::SelfText => "self",
        }
    }
}
