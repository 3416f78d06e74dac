//! Expiry evaluation for templates and their sub-properties.
//!
//! Operators annotate templates, tags, policies, and memberships with an
//! `expires_at` date. Before planning, expired templates are flagged as
//! deleted and expired sub-entries are pruned, so the normal apply path
//! removes them from the provider like any other drift.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::info;

use crate::error::{Result, TemplateError};

use super::model::Template;

/// Parses an operator-authored expiry annotation.
///
/// Accepts RFC 3339 timestamps, `YYYY-MM-DD HH:MM:SS`, and bare
/// `YYYY-MM-DD` dates. Bare dates expire at midnight UTC on that day.
///
/// # Errors
///
/// Returns [`TemplateError::InvalidExpiry`] when the value is not a
/// recognized date format.
pub fn parse_expires_at(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc());
        }
    }
    Err(TemplateError::InvalidExpiry {
        value: raw.to_string(),
        message: String::from("expected an RFC 3339 timestamp or YYYY-MM-DD date"),
    }
    .into())
}

/// Returns true when an annotation is set and lies in the past.
///
/// # Errors
///
/// Returns an error when the annotation cannot be parsed.
pub fn is_expired(expires_at: Option<&str>, now: DateTime<Utc>) -> Result<bool> {
    match expires_at {
        Some(raw) => Ok(parse_expires_at(raw)? <= now),
        None => Ok(false),
    }
}

fn retain_unexpired<T, F>(entries: &mut Vec<T>, expires_of: F, now: DateTime<Utc>) -> Result<bool>
where
    F: Fn(&T) -> Option<&str>,
{
    let before = entries.len();
    // Collect parse failures first so a bad date fails loudly instead of
    // silently keeping the entry.
    for entry in entries.iter() {
        if let Some(raw) = expires_of(entry) {
            parse_expires_at(raw)?;
        }
    }
    entries.retain(|entry| {
        expires_of(entry)
            .and_then(|raw| parse_expires_at(raw).ok())
            .is_none_or(|dt| dt > now)
    });
    Ok(entries.len() != before)
}

/// Flags an expired template as deleted and prunes expired sub-entries.
///
/// Returns true when the template was modified and should be rewritten.
///
/// # Errors
///
/// Returns an error when any expiry annotation cannot be parsed.
pub fn flag_expired(template: &mut Template, now: DateTime<Utc>) -> Result<bool> {
    let mut changed = false;

    if !template.is_deleted() && is_expired(template.expires_at(), now)? {
        info!(
            identifier = template.identifier(),
            "Template expired, marking as deleted"
        );
        template.set_deleted(true);
        changed = true;
    }

    changed |= match template {
        Template::AwsIamRole(t) => {
            let p = &mut t.properties;
            retain_unexpired(&mut p.tags, |e| e.expires_at.as_deref(), now)?
                | retain_unexpired(&mut p.managed_policies, |e| e.expires_at.as_deref(), now)?
                | retain_unexpired(&mut p.inline_policies, |e| e.expires_at.as_deref(), now)?
        }
        Template::AwsIamUser(t) => {
            let p = &mut t.properties;
            retain_unexpired(&mut p.tags, |e| e.expires_at.as_deref(), now)?
                | retain_unexpired(&mut p.groups, |e| e.expires_at.as_deref(), now)?
                | retain_unexpired(&mut p.managed_policies, |e| e.expires_at.as_deref(), now)?
                | retain_unexpired(&mut p.inline_policies, |e| e.expires_at.as_deref(), now)?
        }
        Template::OktaApp(t) => retain_unexpired(
            &mut t.properties.assignments,
            |e| e.expires_at.as_deref(),
            now,
        )?,
        Template::GoogleGroup(t) => retain_unexpired(
            &mut t.properties.members,
            |e| e.expires_at.as_deref(),
            now,
        )?,
    };

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::model::{ResourceTemplate, Tag, UserGroup, UserProperties};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn user_template(expires_at: Option<&str>, groups: Vec<UserGroup>, tags: Vec<Tag>) -> Template {
        Template::AwsIamUser(ResourceTemplate {
            identifier: String::from("foo"),
            included_accounts: vec![String::from("*")],
            excluded_accounts: vec![],
            expires_at: expires_at.map(String::from),
            deleted: false,
            properties: UserProperties {
                user_name: String::from("foo"),
                path: vec![],
                permissions_boundary: vec![],
                groups,
                credentials: vec![],
                tags,
                managed_policies: vec![],
                inline_policies: vec![],
            },
            file_path: None,
        })
    }

    #[test]
    fn test_parse_accepts_rfc3339_and_bare_dates() {
        assert!(parse_expires_at("2026-06-15T12:00:00Z").is_ok());
        assert!(parse_expires_at("2026-06-15 12:00:00").is_ok());
        assert!(parse_expires_at("2026-06-15").is_ok());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_expires_at("next tuesday").unwrap_err();
        assert!(err.to_string().contains("Invalid expiry"));
    }

    #[test]
    fn test_expired_template_is_flagged_deleted() {
        let mut template = user_template(Some("2026-01-01"), vec![], vec![]);
        let changed = flag_expired(&mut template, now()).unwrap();
        assert!(changed);
        assert!(template.is_deleted());
    }

    #[test]
    fn test_future_expiry_leaves_template_alone() {
        let mut template = user_template(Some("2027-01-01"), vec![], vec![]);
        let changed = flag_expired(&mut template, now()).unwrap();
        assert!(!changed);
        assert!(!template.is_deleted());
    }

    #[test]
    fn test_expired_sub_entries_are_pruned() {
        let mut template = user_template(
            None,
            vec![
                UserGroup {
                    group_name: String::from("stale"),
                    expires_at: Some(String::from("2026-01-01")),
                },
                UserGroup {
                    group_name: String::from("kept"),
                    expires_at: Some(String::from("2027-01-01")),
                },
            ],
            vec![Tag {
                key: String::from("temp"),
                value: String::from("1"),
                expires_at: Some(String::from("2026-06-01")),
            }],
        );
        let changed = flag_expired(&mut template, now()).unwrap();
        assert!(changed);
        let Template::AwsIamUser(t) = template else {
            panic!("kind changed");
        };
        assert_eq!(t.properties.groups.len(), 1);
        assert_eq!(t.properties.groups[0].group_name, "kept");
        assert!(t.properties.tags.is_empty());
        assert!(!t.deleted);
    }

    #[test]
    fn test_bad_sub_entry_expiry_errors() {
        let mut template = user_template(
            None,
            vec![UserGroup {
                group_name: String::from("foo"),
                expires_at: Some(String::from("whenever")),
            }],
            vec![],
        );
        assert!(flag_expired(&mut template, now()).is_err());
    }
}
