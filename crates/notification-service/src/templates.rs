use crate::{Alert, AlertType};

pub struct EmailTemplate;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn row(shaded: bool, label: &str, value: &str) -> String {
    let style = if shaded { r#" style="background:#f8fafc;""# } else { "" };
    format!(
        r#"  <tr{style}><td style="padding:8px 12px;color:#94a3b8;">{label}</td><td style="padding:8px 12px;font-weight:600;">{value}</td></tr>"#
    )
}

fn table(rows: &[(&str, String)]) -> String {
    let body: Vec<String> = rows
        .iter()
        .enumerate()
        .map(|(i, (label, value))| row(i % 2 == 1, label, value))
        .collect();
    format!(
        "<table style=\"width:100%;border-collapse:collapse;\">\n{}\n</table>",
        body.join("\n")
    )
}

fn banner(color: &str, text: &str) -> String {
    format!(
        r#"<div style="background:{color};color:#fff;padding:12px 20px;border-radius:8px 8px 0 0;font-size:18px;font-weight:700;">{text}</div>"#
    )
}

impl EmailTemplate {
    pub fn render(alert: &Alert) -> String {
        let body_content = match &alert.alert_type {
            AlertType::TradePlanCreated {
                plan_id,
                session,
                direction,
                entry_zone_start,
                entry_zone_end,
                stop_loss,
                tp1,
                tp2,
                estimated_rr,
                probability_score,
                sizing,
            } => {
                let color = match direction {
                    signal_core::Direction::Short => "#e94560",
                    signal_core::Direction::Long => "#22c55e",
                };
                let levels = table(&[
                    ("Plan", format!("#{plan_id}")),
                    ("Session", session.to_string()),
                    ("Entry Zone", format!("{entry_zone_start:.2} - {entry_zone_end:.2}")),
                    ("Stop Loss", format!("{stop_loss:.2}")),
                    ("Take Profit 1", format!("{tp1:.2}")),
                    ("Take Profit 2", format!("{tp2:.2}")),
                    ("Risk:Reward", format!("1:{estimated_rr:.2}")),
                    ("Probability Score", format!("{probability_score:.0}/100")),
                ]);
                let sizing_table = table(&[
                    ("Account Balance", format!("${:.2}", sizing.account_balance)),
                    ("Risk", format!("{:.2}% (${:.2})", sizing.risk_percent, sizing.risk_amount)),
                    ("Stop Distance", format!("{:.2}", sizing.stop_distance)),
                    ("Suggested Lot Size", format!("{:.2} lots", sizing.lot_size)),
                    ("Suggested Leverage", format!("1:{}", sizing.suggested_leverage)),
                ]);
                format!(
                    "{}\n{levels}\n<div style=\"padding:12px 20px 4px;font-weight:700;color:#334155;\">Position Sizing</div>\n{sizing_table}",
                    banner(color, &format!("XAUUSD {direction} SETUP")),
                )
            }
            AlertType::RiskLimitReached { reason } => format!(
                r#"{}
<div style="padding:16px 20px;">
  <p style="color:#f97316;font-weight:600;font-size:16px;margin:0 0 8px;">No new plans this cycle</p>
  <p style="color:#334155;margin:0;">{}</p>
</div>"#,
                banner("#f97316", "RISK LIMIT REACHED"),
                escape(reason)
            ),
            AlertType::LearningReviewPublished {
                review_id,
                sample_size,
                low_confidence,
                action_items,
                report,
            } => {
                let (color, heading) = if *low_confidence {
                    ("#64748b", format!("Learning Review #{review_id}: low confidence"))
                } else {
                    ("#0099ff", format!("Learning Review #{review_id}"))
                };
                let items = if action_items.is_empty() {
                    "none".to_string()
                } else {
                    action_items
                        .iter()
                        .map(|item| escape(item))
                        .collect::<Vec<_>>()
                        .join("<br>")
                };
                format!(
                    r#"{}
{}
<pre style="margin:0;padding:16px 20px;font-size:12px;color:#334155;white-space:pre-wrap;">{}</pre>"#,
                    banner(color, &heading),
                    table(&[
                        ("Sample Size", sample_size.to_string()),
                        ("Proposed Changes", items),
                    ]),
                    escape(report)
                )
            }
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1"></head>
<body style="margin:0;padding:0;background:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;">
<table width="100%" cellpadding="0" cellspacing="0" style="background:#f1f5f9;padding:32px 0;">
  <tr><td align="center">
    <table width="600" cellpadding="0" cellspacing="0" style="background:#ffffff;border-radius:8px;overflow:hidden;box-shadow:0 1px 3px rgba(0,0,0,0.1);">
      <tr><td>
        {body_content}
      </td></tr>
      <tr><td style="padding:16px 20px;border-top:1px solid #e2e8f0;">
        <p style="margin:0;color:#94a3b8;font-size:12px;">
          {msg}
          <br>Sent at {ts} UTC
        </p>
      </td></tr>
    </table>
    <p style="color:#94a3b8;font-size:11px;margin-top:16px;">XAUUSD Signal Agent. Plans are suggestions only; no orders are placed.</p>
  </td></tr>
</table>
</body>
</html>"#,
            msg = escape(&alert.message),
            ts = alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
        )
    }

    /// Plain-text alternative body for clients that do not render HTML.
    pub fn render_text(alert: &Alert) -> String {
        let mut text = format!("{}\n{}\n\n", alert.title, alert.message);
        match &alert.alert_type {
            AlertType::TradePlanCreated {
                session,
                entry_zone_start,
                entry_zone_end,
                stop_loss,
                tp1,
                tp2,
                estimated_rr,
                probability_score,
                sizing,
                ..
            } => {
                text.push_str(&format!(
                    "Session: {session}\nEntry zone: {entry_zone_start:.2} - {entry_zone_end:.2}\nStop loss: {stop_loss:.2}\nTP1: {tp1:.2}\nTP2: {tp2:.2}\nR:R 1:{estimated_rr:.2}\nScore: {probability_score:.0}/100\nLot size: {:.2} (leverage 1:{})\n",
                    sizing.lot_size, sizing.suggested_leverage
                ));
            }
            AlertType::RiskLimitReached { reason } => {
                text.push_str(reason);
                text.push('\n');
            }
            AlertType::LearningReviewPublished { report, .. } => {
                text.push_str(report);
                text.push('\n');
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PositionSizing;
    use signal_core::{Direction, Session, TradeLevels};

    fn plan_alert() -> Alert {
        let levels = TradeLevels {
            entry_zone_start: 2037.0,
            entry_zone_end: 2039.0,
            stop_loss: 2043.0,
            tp1: 2028.0,
            tp2: 2023.0,
        };
        Alert::new(
            AlertType::TradePlanCreated {
                plan_id: 12,
                session: Session::NewYork,
                direction: Direction::Short,
                entry_zone_start: levels.entry_zone_start,
                entry_zone_end: levels.entry_zone_end,
                stop_loss: levels.stop_loss,
                tp1: levels.tp1,
                tp2: levels.tp2,
                estimated_rr: 2.0,
                probability_score: 78.0,
                sizing: PositionSizing::compute(10_000.0, 0.5, &levels),
            },
            "XAUUSD SHORT ALERT",
            "Plan #12 <scored 78>",
        )
    }

    #[test]
    fn test_plan_email_lists_levels_and_sizing() {
        let html = EmailTemplate::render(&plan_alert());
        assert!(html.contains("XAUUSD SHORT SETUP"));
        assert!(html.contains("2037.00 - 2039.00"));
        assert!(html.contains("NEW_YORK"));
        assert!(html.contains("1.00 lots"));
        assert!(html.contains("1:10"));
        assert!(html.contains("Plan #12 &lt;scored 78&gt;"));
    }

    #[test]
    fn test_review_email_escapes_report() {
        let alert = Alert::new(
            AlertType::LearningReviewPublished {
                review_id: 2,
                sample_size: 14,
                low_confidence: false,
                action_items: vec!["spread_value < 0.3".to_string()],
                report: "avg R < 0 in NEW_YORK".to_string(),
            },
            "Learning review #2",
            "Window",
        );
        let html = EmailTemplate::render(&alert);
        assert!(html.contains("spread_value &lt; 0.3"));
        assert!(html.contains("avg R &lt; 0 in NEW_YORK"));

        let text = EmailTemplate::render_text(&alert);
        assert!(text.contains("avg R < 0 in NEW_YORK"));
    }

    #[test]
    fn test_text_body_for_plan() {
        let text = EmailTemplate::render_text(&plan_alert());
        assert!(text.starts_with("XAUUSD SHORT ALERT"));
        assert!(text.contains("Stop loss: 2043.00"));
        assert!(text.contains("Lot size: 1.00 (leverage 1:10)"));
    }
}
