//! Detection of "virtual name" columns: SELECT names like `owneridname`
//! that resolve to the display name of a base lookup/optionset/state
//! attribute (`ownerid`) rather than being a real column on the entity.

/// Metadata recorded for a detected virtual column so the executor can
/// materialize the display name after retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualColumnInfo {
    pub base_column_name: String,
    pub base_column_explicitly_queried: bool,
    pub alias: Option<String>,
}

/// Returns the base column name if `select_name` fits the naming
/// convention for a virtual display-name column, else `None`.
///
/// The convention: the name ends in `name`, the stripped prefix is
/// non-empty, and that prefix either ends in `id`/`code`/`type`, equals
/// `statecode`/`statuscode`, or starts with `is`/`do`/`has`.
pub fn detect_virtual_base(select_name: &str) -> Option<String> {
    let lower = select_name.to_ascii_lowercase();
    if lower == "name" || !lower.ends_with("name") {
        return None;
    }
    let base = &lower[..lower.len() - "name".len()];
    if base.is_empty() {
        return None;
    }
    let qualifies = base.ends_with("id")
        || base.ends_with("code")
        || base.ends_with("type")
        || base == "statecode"
        || base == "statuscode"
        || base.starts_with("is")
        || base.starts_with("do")
        || base.starts_with("has");
    qualifies.then(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_lookup_name_column() {
        assert_eq!(detect_virtual_base("owneridname"), Some("ownerid".into()));
    }

    #[test]
    fn detects_optionset_name_column() {
        assert_eq!(
            detect_virtual_base("statuscodename"),
            Some("statuscode".into())
        );
    }

    #[test]
    fn detects_boolean_prefixed_name_column() {
        assert_eq!(
            detect_virtual_base("isdisabledname"),
            Some("isdisabled".into())
        );
    }

    #[test]
    fn rejects_plain_name_column() {
        assert_eq!(detect_virtual_base("name"), None);
        assert_eq!(detect_virtual_base("fullname"), None);
    }

    #[test]
    fn rejects_columns_not_ending_in_name() {
        assert_eq!(detect_virtual_base("revenue"), None);
    }
}
