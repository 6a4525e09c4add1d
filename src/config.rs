/// Knobs shared by every file of one compiler session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Language-level calls nested deeper than this fail with "Stack overflow."
    pub max_call_depth: usize,
    /// Appended to import paths that don't already end in it.
    pub extension: &'static str,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_call_depth: 512,
            extension: "vuel",
        }
    }
}
