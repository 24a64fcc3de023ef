//! Inspecting restore payloads.

/// Counts case blocks in either protocol version.
pub fn count_case_blocks(payload: &str) -> usize {
    payload.matches("<case>").count() + payload.matches("<case ").count()
}

/// Extracts the new sync token.
pub fn restore_id(payload: &str) -> Option<String> {
    text_of(payload, "restore_id").map(str::to_string)
}

/// Returns the text of the first `<tag>...</tag>` in a payload.
pub fn text_of<'a>(payload: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = payload.find(&open)? + open.len();
    let end = payload[start..].find(&close)? + start;
    Some(&payload[start..end])
}

/// Returns true if the payload carries a block for `case_id`.
pub fn has_case(payload: &str, case_id: &str) -> bool {
    payload.contains(&format!("<case_id>{case_id}</case_id>"))
        || payload.contains(&format!("case_id=\"{case_id}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspects_payloads() {
        let payload = "<OpenRosaResponse><Sync><restore_id>abc</restore_id></Sync>\
            <case><case_id>c1</case_id></case><case case_id=\"c2\"/></OpenRosaResponse>";
        assert_eq!(count_case_blocks(payload), 2);
        assert_eq!(restore_id(payload).as_deref(), Some("abc"));
        assert!(has_case(payload, "c1"));
        assert!(has_case(payload, "c2"));
        assert!(!has_case(payload, "c3"));
        assert_eq!(text_of(payload, "missing"), None);
    }
}
