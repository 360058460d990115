//! TwiML documents returned to Twilio's voice webhooks.

const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Context carried on the recording-status callback so the completed
/// recording can be attached to the right user, lead and campaign.
#[derive(Debug, Clone, Default)]
pub struct RecordingContext<'a> {
    pub user_id: &'a str,
    pub lead_id: &'a str,
    pub campaign_id: &'a str,
    pub lead_name: &'a str,
    pub phone: &'a str,
}

/// Bridge the agent to `to` without recording.
pub fn plain_bridge(caller_id: &str, to: &str) -> String {
    format!(
        r#"{HEADER}
<Response>
  <Dial callerId="{caller_id}">{to}</Dial>
</Response>"#,
        caller_id = escape(caller_id),
        to = escape(to),
    )
}

/// Bridge the agent to `to`, recording from answer and reporting the
/// finished recording to `callback_url`.
pub fn recorded_bridge(caller_id: &str, to: &str, callback_url: &str) -> String {
    format!(
        r#"{HEADER}
<Response>
  <Dial callerId="{caller_id}" record="record-from-answer" recordingStatusCallback="{callback}" recordingStatusCallbackMethod="POST">{to}</Dial>
</Response>"#,
        caller_id = escape(caller_id),
        callback = escape(callback_url),
        to = escape(to),
    )
}

/// Speak `message` and end the call.
pub fn say(message: &str) -> String {
    format!(
        r#"{HEADER}
<Response>
  <Say>{message}</Say>
</Response>"#,
        message = escape(message),
    )
}

/// Build the recording-status callback URL.
///
/// Empty parameters are left out. The display name loses every
/// non-alphanumeric character to `_`, the phone keeps only digits and `+`,
/// and all values are percent-encoded.
pub fn recording_callback_url(base: &str, ctx: &RecordingContext<'_>) -> String {
    let lead_name: String = ctx
        .lead_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let phone: String = ctx
        .phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    let params = [
        ("userId", ctx.user_id),
        ("leadId", ctx.lead_id),
        ("campaignId", ctx.campaign_id),
        ("leadName", lead_name.as_str()),
        ("phone", phone.as_str()),
    ];

    let query: Vec<String> = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();

    if query.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", query.join("&"))
    }
}

/// Escape text for use in XML content and attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
