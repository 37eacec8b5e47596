//! Options for building query chains.

/// Options applied by a [`QueryChain`](crate::QueryChain).
///
/// ```
/// use chainql::ChainOptions;
///
/// let options = ChainOptions::default()
///     .with_identifier_prefix("_gen")
///     .with_max_chain_length(32);
/// assert_eq!(options.max_chain_length, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOptions {
    /// Prefix for generated identifiers of nodes that have neither a hint nor
    /// a named lambda parameter
    pub identifier_prefix: String,
    /// Maximum number of nodes in one chain, including the head
    pub max_chain_length: usize,
}

impl Default for ChainOptions {
    fn default() -> Self {
        ChainOptions {
            identifier_prefix: "_".to_string(),
            max_chain_length: 256,
        }
    }
}

impl ChainOptions {
    pub fn with_identifier_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.identifier_prefix = prefix.into();
        self
    }

    pub fn with_max_chain_length(mut self, max: usize) -> Self {
        self.max_chain_length = max;
        self
    }
}
