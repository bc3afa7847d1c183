//! 排除列表过滤

use crate::package_manager::PackageRecord;

/// 名称或 id 中包含任一排除项（不区分大小写）即被排除；空字符串忽略
pub fn is_excluded(record: &PackageRecord, exclusions: &[String]) -> bool {
    let name = record.name.to_lowercase();
    let id = record.id.to_lowercase();
    exclusions
        .iter()
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .any(|term| name.contains(&term) || id.contains(&term))
}

pub fn apply(records: &[PackageRecord], exclusions: &[String]) -> Vec<PackageRecord> {
    records
        .iter()
        .filter(|record| !is_excluded(record, exclusions))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, id: &str) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            id: id.to_string(),
            installed_version: "1.0".to_string(),
            available_version: "2.0".to_string(),
            source: "winget".to_string(),
        }
    }

    fn sample() -> Vec<PackageRecord> {
        vec![
            record("Slack Technologies", "SlackTechnologies.Slack"),
            record("Microsoft Edge", "Microsoft.Edge"),
            record("Teams", "Microsoft.Teams"),
        ]
    }

    #[test]
    fn test_matches_name_or_id_case_insensitive() {
        let kept = apply(&sample(), &["SLACK".to_string()]);
        let names: Vec<&str> = kept.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Microsoft Edge", "Teams"]);

        // 只命中 Teams 的 id
        let kept = apply(&sample(), &["microsoft.teams".to_string()]);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.id != "Microsoft.Teams"));
    }

    #[test]
    fn test_empty_terms_exclude_nothing() {
        assert_eq!(apply(&sample(), &[]).len(), 3);
        assert_eq!(apply(&sample(), &["".to_string(), "  ".to_string()]).len(), 3);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let exclusions = vec!["edge".to_string(), "teams".to_string()];
        let once = apply(&sample(), &exclusions);
        let twice = apply(&once, &exclusions);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 1);
    }

    #[test]
    fn test_concrete_slack_exclusion() {
        let records = vec![
            record("Slack Technologies", "SlackTechnologies.Slack"),
            record("Microsoft Edge", "Microsoft.Edge"),
        ];
        let kept = apply(&records, &["slack".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "Microsoft Edge");
    }
}
