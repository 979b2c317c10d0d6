#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DecodeLimits {
    /// Upper bound for a single field name or value, checked before the value is buffered.
    pub max_field_bytes: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_field_bytes: 64 * 1024 * 1024,
        }
    }
}
