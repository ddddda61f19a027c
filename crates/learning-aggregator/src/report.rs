use std::fmt::Write;

use signal_core::LearningReview;

/// Plain-text rendering of a review for terminals and email bodies.
pub fn render_report(review: &LearningReview) -> String {
    let mut out = String::new();
    let title = match review.id {
        Some(id) => format!("SELF-LEARNING REVIEW #{} - XAUUSD", id),
        None => "SELF-LEARNING REVIEW - XAUUSD".to_string(),
    };

    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "=".repeat(title.len()));
    let _ = writeln!(
        out,
        "Window: {} .. {}",
        review.window_start.format("%Y-%m-%d %H:%M"),
        review.window_end.format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(out, "Sample size: {} trades", review.sample_size);
    let _ = writeln!(out);

    let _ = writeln!(out, "REGIME ANALYSIS");
    let _ = writeln!(out, "---------------");
    let _ = writeln!(out, "{}", review.regime_notes);

    if review.low_confidence {
        return out;
    }

    section(&mut out, "HIGH-PERFORMING CONDITIONS");
    if review.high_performing_conditions.is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for c in &review.high_performing_conditions {
        let _ = writeln!(
            out,
            "{:<30} {:<18} {:>5.1}%  {:+.2}R  n={}",
            c.dimension.as_str(),
            c.condition,
            c.win_rate * 100.0,
            c.avg_r_multiple,
            c.trades
        );
    }

    section(&mut out, "LOSS-PRONE CONDITIONS");
    if review.loss_prone_conditions.is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for c in &review.loss_prone_conditions {
        let _ = writeln!(
            out,
            "{:<30} {:<18} {:>5.1}%  {:+.2}R  n={}",
            c.dimension.as_str(),
            c.condition,
            c.win_rate * 100.0,
            c.avg_r_multiple,
            c.trades
        );
    }

    section(&mut out, "FILTER STRENGTH");
    if review.strongest_filters.is_empty() {
        let _ = writeln!(out, "(no gate separates marginal from clear trades)");
    }
    for f in &review.strongest_filters {
        let _ = writeln!(
            out,
            "{:<24} {:+.1} pts  (clear {:.1}% {:+.2}R n={}, marginal {:.1}% {:+.2}R n={})",
            f.predicate.as_str(),
            f.sensitivity * 100.0,
            f.win_rate_clear * 100.0,
            f.avg_r_clear,
            f.clear_trades,
            f.win_rate_marginal * 100.0,
            f.avg_r_marginal,
            f.marginal_trades
        );
    }

    section(&mut out, "RECOMMENDATIONS");
    if review.action_items.is_empty() {
        let _ = writeln!(out, "(no threshold changes proposed)");
    }
    for item in &review.action_items {
        let _ = writeln!(out, "- {}  [{}]", item, item.rationale);
    }

    out
}

fn section(out: &mut String, name: &str) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", name);
    let _ = writeln!(out, "{}", "-".repeat(name.len()));
}
