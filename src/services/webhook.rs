use crate::models::{DedupeReport, NotifyError};
use log::{debug, error, info};
use serde_json::json;
use std::fmt::Write;

const ACCENT_CLEAN: u32 = 0x0057_F287;
const ACCENT_DRY_RUN: u32 = 0x00FE_E75C;
const ACCENT_FAILED: u32 = 0x00ED_4245;

/// Most groups listed in one message; the rest are summarised as a count.
const MAX_LISTED_GROUPS: usize = 10;

#[derive(Clone)]
pub struct WebhookNotifier {
    name: Option<String>,
    webhook_url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(webhook_url: String, name: Option<String>) -> Self {
        Self {
            name,
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Post a finished run's report.
    ///
    /// # Errors
    /// Returns `NotifyError` if the webhook request fails or is rejected.
    pub async fn notify_report(&self, report: &DedupeReport) -> Result<(), NotifyError> {
        let accent = if report.dry_run {
            ACCENT_DRY_RUN
        } else {
            ACCENT_CLEAN
        };
        self.send(build_report_container(report, accent)).await
    }

    /// Post a failed run. `report` is present when the run got as far as
    /// deleting (a partial delete).
    ///
    /// # Errors
    /// Returns `NotifyError` if the webhook request fails or is rejected.
    pub async fn notify_failure(
        &self,
        reason: &str,
        report: Option<&DedupeReport>,
    ) -> Result<(), NotifyError> {
        let mut container = match report {
            Some(report) => build_report_container(report, ACCENT_FAILED),
            None => json!({
                "type": 17,
                "accent_color": ACCENT_FAILED,
                "components": [],
            }),
        };
        if let Some(components) = container["components"].as_array_mut() {
            components.insert(0, text_display(&format!("## Cleanup failed\n\n{reason}")));
        }
        self.send(container).await
    }

    async fn send(&self, container: serde_json::Value) -> Result<(), NotifyError> {
        let notifier_name = self.name.as_deref().unwrap_or("default");
        debug!(
            "sending webhook (notifier={}) accent={}",
            notifier_name, container["accent_color"]
        );

        let payload = json!({ "components": [container], "flags": 32768 });

        let webhook_url_with_params = format!("{}?with_components=true", self.webhook_url);

        let response = self
            .client
            .post(&webhook_url_with_params)
            .json(&payload)
            .send()
            .await
            .map_err(NotifyError::SendFailed)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("webhook failed for notifier={notifier_name}: status={status}, body={body}");
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        info!("sent cleanup report to notifier: {notifier_name}");
        Ok(())
    }
}

fn text_display(content: &str) -> serde_json::Value {
    json!({ "type": 10, "content": content })
}

fn separator() -> serde_json::Value {
    json!({ "type": 14, "divider": true, "spacing": 1 })
}

fn build_counts_desc(report: &DedupeReport) -> String {
    let mut desc = String::from("## Duplicate alert cleanup");
    if report.dry_run {
        desc.push_str(" (dry run)");
    }
    let _ = write!(
        desc,
        "\n\n**Before:** {}\n**Duplicate groups:** {}\n**Deleted:** {}\n**After:** {}",
        report.count_before, report.duplicate_groups, report.count_deleted, report.count_after
    );
    if report.dry_run {
        let _ = write!(desc, "\n**Would delete:** {}", report.planned_deletions);
    }
    desc
}

fn build_groups_desc(report: &DedupeReport) -> String {
    let mut desc = String::from("## Groups");
    for decision in report.decisions.iter().take(MAX_LISTED_GROUPS) {
        let _ = write!(
            desc,
            "\n- {} ({} → 1, kept `{}`)",
            decision.key,
            decision.group_size(),
            decision.kept_id
        );
    }
    let hidden = report.decisions.len().saturating_sub(MAX_LISTED_GROUPS);
    if hidden > 0 {
        let _ = write!(desc, "\n- … and {hidden} more");
    }
    desc
}

fn build_report_container(report: &DedupeReport, accent: u32) -> serde_json::Value {
    let mut components = vec![text_display(&build_counts_desc(report))];

    if !report.decisions.is_empty() {
        components.push(separator());
        components.push(text_display(&build_groups_desc(report)));
    }

    components.push(separator());
    components.push(text_display(&format!(
        "-# Finished <t:{}:R>",
        report.finished_at.timestamp()
    )));

    json!({
        "type": 17,
        "accent_color": accent,
        "spoiler": false,
        "components": components,
    })
}
