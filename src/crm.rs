//! Lead ordering, dispositions, recording folders and credential form rules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::format;
use crate::store::{Campaign, Credentials, Lead, Recording};

/// Folder key for recordings made outside any campaign.
pub const TESTING_FOLDER: &str = "testing";

/// Placeholder the disposition picker shows before a choice is made.
const DISPOSITION_PLACEHOLDER: &str = "Select Disposition...";

/// Sort key of a lead id: the digits in its last `-`-separated segment.
/// `camp-a-lead-12` sorts as 12; ids without digits sort as 0.
pub fn lead_sort_order(id: &str) -> u64 {
    let suffix = id.rsplit('-').next().unwrap_or(id);
    let digits: String = suffix
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

pub fn sort_leads(leads: &mut [Lead]) {
    leads.sort_by_key(|l| lead_sort_order(&l.id));
}

/// The lead after `current` in an already sorted list.
pub fn next_lead<'a>(leads: &'a [Lead], current: &str) -> Option<&'a Lead> {
    let index = leads.iter().position(|l| l.id == current)?;
    leads.get(index + 1)
}

pub fn is_valid_disposition(status: &str) -> bool {
    let status = status.trim();
    !status.is_empty() && status != DISPOSITION_PLACEHOLDER
}

/// Basic E.164 check: `+` then 7-15 digits.
pub fn is_e164(s: &str) -> bool {
    match s.strip_prefix('+') {
        Some(digits) => {
            (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingView {
    #[serde(flatten)]
    pub recording: Recording,
    /// `m:ss`
    pub duration_label: String,
    /// `Today`, `Yesterday`, weekday or short date.
    pub date_label: String,
    /// `h:mm AM`
    pub time_label: String,
}

impl RecordingView {
    pub fn new(recording: Recording, now: DateTime<Utc>) -> Self {
        Self {
            duration_label: format::format_duration(recording.duration),
            date_label: format::format_call_date(recording.call_date, now),
            time_label: format::format_clock(recording.call_date),
            recording,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingFolder {
    pub campaign_id: String,
    pub name: String,
    pub count: usize,
    pub recordings: Vec<RecordingView>,
}

/// Group recordings into campaign folders.
///
/// Recordings without a campaign land in the `testing` folder. Folders are
/// ordered by campaign name with `testing` always last; recordings keep the
/// order they were given in.
pub fn recording_folders(
    recordings: Vec<Recording>,
    campaigns: &[Campaign],
    now: DateTime<Utc>,
) -> Vec<RecordingFolder> {
    let mut grouped: BTreeMap<String, Vec<RecordingView>> = BTreeMap::new();
    for recording in recordings {
        let key = recording
            .campaign_id
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| TESTING_FOLDER.to_string());
        grouped
            .entry(key)
            .or_default()
            .push(RecordingView::new(recording, now));
    }

    let mut folders: Vec<RecordingFolder> = grouped
        .into_iter()
        .map(|(campaign_id, recordings)| RecordingFolder {
            name: folder_name(&campaign_id, campaigns),
            count: recordings.len(),
            campaign_id,
            recordings,
        })
        .collect();

    folders.sort_by(|a, b| {
        let a_testing = a.campaign_id == TESTING_FOLDER;
        let b_testing = b.campaign_id == TESTING_FOLDER;
        a_testing.cmp(&b_testing).then_with(|| a.name.cmp(&b.name))
    });
    folders
}

fn folder_name(campaign_id: &str, campaigns: &[Campaign]) -> String {
    if campaign_id == TESTING_FOLDER {
        return "Testing".to_string();
    }
    campaigns
        .iter()
        .find(|c| c.id == campaign_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "Unknown Campaign".to_string())
}

/// Credential settings as submitted by the settings form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsForm {
    #[serde(default, deserialize_with = "nullable")]
    pub account_sid: String,
    #[serde(default, deserialize_with = "nullable")]
    pub auth_token: String,
    #[serde(default, deserialize_with = "nullable")]
    pub phone_number: String,
    #[serde(default, deserialize_with = "nullable")]
    pub api_key: String,
    #[serde(default, deserialize_with = "nullable")]
    pub api_secret: String,
    #[serde(default, deserialize_with = "nullable")]
    pub twiml_app_sid: String,
    #[serde(default, deserialize_with = "nullable")]
    pub forward_to_number: String,
}

/// A loaded form echoes absent fields back as `null`.
fn nullable<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CredentialsFormError {
    #[error("Account SID, Auth Token, and Phone Number are required")]
    MissingRequired,
}

impl CredentialsForm {
    /// Validate and turn the form into a record. Optional fields left blank
    /// are stored as absent.
    pub fn into_credentials(self, user_id: &str) -> Result<Credentials, CredentialsFormError> {
        let account_sid = self.account_sid.trim();
        let auth_token = self.auth_token.trim();
        let phone_number = self.phone_number.trim();
        if account_sid.is_empty() || auth_token.is_empty() || phone_number.is_empty() {
            return Err(CredentialsFormError::MissingRequired);
        }

        let optional = |s: String| {
            let s = s.trim().to_string();
            (!s.is_empty()).then_some(s)
        };

        Ok(Credentials {
            user_id: user_id.to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            phone_number: phone_number.to_string(),
            api_key: optional(self.api_key),
            api_secret: optional(self.api_secret),
            twiml_app_sid: optional(self.twiml_app_sid),
            forward_to_number: optional(self.forward_to_number),
            updated_at: None,
        })
    }
}

/// Mask a secret for display: the first four characters, then `***`.
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() > 4 {
        let head: String = secret.chars().take(4).collect();
        format!("{head}***")
    } else {
        "***".to_string()
    }
}

/// Credentials as shown back to the dashboard, secrets masked.
pub fn masked(credentials: &Credentials) -> Credentials {
    Credentials {
        auth_token: mask_secret(&credentials.auth_token),
        api_secret: credentials.api_secret.as_deref().map(mask_secret),
        ..credentials.clone()
    }
}

/// Restore secrets a form echoed back in masked form.
///
/// The dashboard loads [`masked`] credentials and saves the whole form, so an
/// unchanged secret arrives as its mask. Such a value, or an empty API secret,
/// keeps what is stored.
pub fn unmask(mut submitted: Credentials, stored: Option<&Credentials>) -> Credentials {
    let Some(stored) = stored else {
        return submitted;
    };

    if submitted.auth_token == mask_secret(&stored.auth_token) {
        submitted.auth_token = stored.auth_token.clone();
    }
    if let Some(stored_secret) = &stored.api_secret {
        let unchanged = submitted
            .api_secret
            .as_deref()
            .map_or(true, |s| s == mask_secret(stored_secret));
        if unchanged {
            submitted.api_secret = Some(stored_secret.clone());
        }
    }
    submitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lead(id: &str) -> Lead {
        Lead {
            id: id.to_string(),
            campaign_id: "camp-1".to_string(),
            name: id.to_string(),
            phone: "+15550100".to_string(),
            email: None,
            status: "New".to_string(),
            summary: None,
        }
    }

    fn recording(id: &str, campaign: Option<&str>) -> Recording {
        Recording {
            id: id.to_string(),
            user_id: "u1".to_string(),
            lead_id: None,
            campaign_id: campaign.map(String::from),
            lead_name: "Unknown".to_string(),
            phone_number: "+15550100".to_string(),
            recording_url: String::new(),
            recording_sid: format!("RE{id}"),
            duration: 75,
            call_date: Utc.with_ymd_and_hms(2026, 10, 18, 15, 4, 0).unwrap(),
        }
    }

    fn campaign(id: &str, name: &str) -> Campaign {
        Campaign {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn sort_order_reads_numeric_suffix() {
        assert_eq!(lead_sort_order("camp-1-lead-12"), 12);
        assert_eq!(lead_sort_order("lead-7"), 7);
        assert_eq!(lead_sort_order("row42"), 42);
        assert_eq!(lead_sort_order("lead-x"), 0);
        assert_eq!(lead_sort_order(""), 0);
    }

    #[test]
    fn leads_sort_numerically_not_lexically() {
        let mut leads = vec![lead("l-10"), lead("l-2"), lead("l-1")];
        sort_leads(&mut leads);
        let ids: Vec<&str> = leads.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["l-1", "l-2", "l-10"]);
    }

    #[test]
    fn next_lead_walks_the_list() {
        let leads = vec![lead("l-1"), lead("l-2")];
        assert_eq!(next_lead(&leads, "l-1").map(|l| l.id.as_str()), Some("l-2"));
        assert!(next_lead(&leads, "l-2").is_none());
        assert!(next_lead(&leads, "l-9").is_none());
    }

    #[test]
    fn disposition_placeholder_is_invalid() {
        assert!(is_valid_disposition("Demo Booked"));
        assert!(!is_valid_disposition("Select Disposition..."));
        assert!(!is_valid_disposition("  "));
    }

    #[test]
    fn e164_validation() {
        assert!(is_e164("+15551234567"));
        assert!(!is_e164("15551234567"));
        assert!(!is_e164("+1555abc"));
        assert!(!is_e164("+1234"));
    }

    #[test]
    fn folders_sort_by_name_with_testing_last() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 20, 0, 0).unwrap();
        let folders = recording_folders(
            vec![
                recording("1", None),
                recording("2", Some("c-zeta")),
                recording("3", Some("c-alpha")),
                recording("4", Some("c-zeta")),
                recording("5", Some("c-gone")),
            ],
            &[campaign("c-zeta", "Zeta"), campaign("c-alpha", "Alpha")],
            now,
        );

        let names: Vec<&str> = folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Unknown Campaign", "Zeta", "Testing"]);
        assert_eq!(folders[2].count, 2);
        assert_eq!(folders[2].recordings[0].recording.id, "2");

        let view = &folders[0].recordings[0];
        assert_eq!(view.duration_label, "1:15");
        assert_eq!(view.date_label, "Today");
        assert_eq!(view.time_label, "3:04 PM");
    }

    #[test]
    fn credentials_form_requires_core_fields() {
        let form = CredentialsForm {
            account_sid: "AC1".to_string(),
            auth_token: " ".to_string(),
            phone_number: "+15550100".to_string(),
            ..Default::default()
        };
        assert_eq!(
            form.into_credentials("u1"),
            Err(CredentialsFormError::MissingRequired)
        );
    }

    #[test]
    fn credentials_form_blank_optionals_are_absent() {
        let form = CredentialsForm {
            account_sid: "AC1".to_string(),
            auth_token: "tok".to_string(),
            phone_number: "+15550100".to_string(),
            api_key: "SK1".to_string(),
            forward_to_number: "  ".to_string(),
            ..Default::default()
        };
        let creds = form.into_credentials("u1").unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("SK1"));
        assert!(creds.api_secret.is_none());
        assert!(creds.forward_to_number.is_none());
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret("abcdef123"), "abcd***");
        assert_eq!(mask_secret("abc"), "***");

        let creds = CredentialsForm {
            account_sid: "AC1".to_string(),
            auth_token: "supersecret".to_string(),
            phone_number: "+15550100".to_string(),
            api_secret: "sk_secret".to_string(),
            ..Default::default()
        }
        .into_credentials("u1")
        .unwrap();
        let shown = masked(&creds);
        assert_eq!(shown.auth_token, "supe***");
        assert_eq!(shown.api_secret.as_deref(), Some("sk_s***"));
        assert_eq!(shown.account_sid, "AC1");
    }

    #[test]
    fn masked_secrets_are_restored_on_save() {
        let form = |auth: &str, secret: &str| {
            CredentialsForm {
                account_sid: "AC1".to_string(),
                auth_token: auth.to_string(),
                phone_number: "+15550100".to_string(),
                api_secret: secret.to_string(),
                ..Default::default()
            }
            .into_credentials("u1")
            .unwrap()
        };
        let stored = form("supersecret", "sk_secret");

        let echoed = unmask(form("supe***", "sk_s***"), Some(&stored));
        assert_eq!(echoed.auth_token, "supersecret");
        assert_eq!(echoed.api_secret.as_deref(), Some("sk_secret"));

        let blank = unmask(form("supe***", ""), Some(&stored));
        assert_eq!(blank.api_secret.as_deref(), Some("sk_secret"));

        let changed = unmask(form("newtoken", "sk_new"), Some(&stored));
        assert_eq!(changed.auth_token, "newtoken");
        assert_eq!(changed.api_secret.as_deref(), Some("sk_new"));

        let first = unmask(form("supe***", ""), None);
        assert_eq!(first.auth_token, "supe***");
        assert!(first.api_secret.is_none());
    }
}
