use crate::subscription::SourceKind;

/// Stable subscription id: `<kind>:<identity>#<destination>`.
///
/// Deterministic so that the same add request always maps to the same id,
/// and destination-qualified so one source tracked into two destinations
/// keeps two independent markers.
pub fn subscription_id(kind: SourceKind, source_identity: &str, destination: &str) -> String {
    format!("{}:{}#{}", kind.as_str(), source_identity, destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_id_is_deterministic() {
        let a = subscription_id(SourceKind::Stream, "xqc", "42");
        assert_eq!(a, "stream:xqc#42");
        assert_eq!(a, subscription_id(SourceKind::Stream, "xqc", "42"));
        assert_ne!(a, subscription_id(SourceKind::Stream, "xqc", "43"));
        assert_ne!(a, subscription_id(SourceKind::Timeline, "xqc", "42"));
    }
}
