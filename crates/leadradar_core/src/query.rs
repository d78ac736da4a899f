use crate::schema::SourcePack;

/// Freelance marketplaces excluded from every query.
pub const NEGATIVE_SITES_BLOCK: &str =
    "-site:upwork.com -site:fiverr.com -site:freelancer.com -site:peopleperhour.com";

pub fn site_constraint(pack: SourcePack) -> &'static str {
    match pack {
        SourcePack::Forums => "(site:reddit.com OR site:quora.com OR site:redditmedia.com)",
        SourcePack::Social => "(site:x.com OR site:facebook.com OR site:twitter.com)",
        SourcePack::Professional => "(site:linkedin.com OR site:medium.com)",
        SourcePack::WideWeb => "",
    }
}

pub fn source_pack_label(pack: SourcePack) -> &'static str {
    match pack {
        SourcePack::Forums => "Forums (Reddit, Quora)",
        SourcePack::Social => "Social (X, Facebook)",
        SourcePack::Professional => "Professional (LinkedIn, Medium)",
        SourcePack::WideWeb => "Wide Web (No site constraints)",
    }
}

/// Compose the literal `q` string sent to the search API.
///
/// Order is site constraint, base text, then the negative block (fixed
/// marketplaces followed by `extra_blocked_hosts` in the given order).
pub fn build_final_query(
    base_query_text: &str,
    pack: SourcePack,
    extra_blocked_hosts: &[String],
) -> String {
    let extra_negatives = extra_blocked_hosts
        .iter()
        .map(|host| host.trim())
        .filter(|host| !host.is_empty())
        .map(|host| format!("-site:{host}"))
        .collect::<Vec<_>>()
        .join(" ");

    let negative_block = [NEGATIVE_SITES_BLOCK, extra_negatives.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    [site_constraint(pack), base_query_text, negative_block.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forums_pack_prefixes_site_constraint() {
        let query = build_final_query("\"need an editor\"", SourcePack::Forums, &[]);
        assert_eq!(
            query,
            "(site:reddit.com OR site:quora.com OR site:redditmedia.com) \"need an editor\" \
             -site:upwork.com -site:fiverr.com -site:freelancer.com -site:peopleperhour.com"
        );
    }

    #[test]
    fn wide_web_has_no_site_constraint_but_keeps_negatives() {
        let extra = vec!["guru.com".to_string(), "toptal.com".to_string()];
        let query = build_final_query("hiring shorts editor", SourcePack::WideWeb, &extra);
        assert!(!query.contains("(site:"));
        assert!(query.starts_with("hiring shorts editor "));
        assert!(query.contains(NEGATIVE_SITES_BLOCK));
        assert!(query.ends_with("-site:guru.com -site:toptal.com"));
    }

    #[test]
    fn empty_base_text_is_skipped_without_double_spaces() {
        let query = build_final_query("", SourcePack::Professional, &[]);
        assert_eq!(
            query,
            format!("(site:linkedin.com OR site:medium.com) {NEGATIVE_SITES_BLOCK}")
        );
        assert!(!query.contains("  "));
    }

    #[test]
    fn blank_blocklist_entries_are_ignored() {
        let extra = vec!["  ".to_string(), " behance.net ".to_string()];
        let query = build_final_query("reels", SourcePack::Social, &extra);
        assert!(query.ends_with("-site:peopleperhour.com -site:behance.net"));
    }
}
