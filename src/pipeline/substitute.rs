//! Canonical names for legacy or ambiguous mimetypes.
//!
//! Signature libraries still report a handful of pre-registration media
//! types. They are rewritten at the point a sniffed mimetype is packaged
//! into a [`crate::StreamInfo`], so converters only ever match on the
//! canonical spelling.

/// Legacy mimetype → canonical mimetype.
pub static MIMETYPE_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("application/excel", "application/vnd.ms-excel"),
    ("application/mspowerpoint", "application/vnd.ms-powerpoint"),
];

/// Return the canonical form of `raw`, or `raw` itself when unmapped.
pub fn substitute(raw: &str) -> &str {
    MIMETYPE_SUBSTITUTIONS
        .iter()
        .find(|(legacy, _)| *legacy == raw)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn excel_is_canonicalised() {
        assert_eq!(substitute("application/excel"), "application/vnd.ms-excel");
    }

    #[test]
    fn powerpoint_is_canonicalised() {
        assert_eq!(
            substitute("application/mspowerpoint"),
            "application/vnd.ms-powerpoint"
        );
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert_eq!(substitute("Application/Excel"), "Application/Excel");
    }

    #[test]
    fn canonical_values_are_fixed_points() {
        for (_, canonical) in MIMETYPE_SUBSTITUTIONS {
            assert_eq!(substitute(canonical), *canonical);
        }
    }

    proptest! {
        #[test]
        fn unmapped_values_pass_through(raw in "[a-z]{1,10}/[a-z0-9.+-]{1,20}") {
            prop_assume!(!MIMETYPE_SUBSTITUTIONS.iter().any(|(legacy, _)| *legacy == raw));
            prop_assert_eq!(substitute(&raw), raw.as_str());
        }
    }
}
