//! HTML rendering for the board.
//!
//! Pages are built with plain string formatting; charts are inline SVG
//! polylines so the board needs no JavaScript.

use std::collections::BTreeMap;

use voxseg::logging::event_log::{ImageRecord, ScalarRecord};

use crate::form::url_encode;

const STYLE: &str = "body{font-family:sans-serif;margin:2em;background:#fafafa;color:#222}\
h1,h2,h3{font-weight:500}table{border-collapse:collapse}td,th{padding:4px 10px;border-bottom:1px solid #ddd;text-align:left}\
.chart{background:#fff;border:1px solid #ddd;margin:0 1em 1em 0}.imgs img{image-rendering:pixelated;width:160px;margin:2px;border:1px solid #ccc}";

pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{}</title><style>{STYLE}</style></head>\
         <body>{body}</body></html>",
        escape(title)
    )
}

/// Scalar records grouped by tag, each series in logged order.
pub fn group_by_tag(records: &[ScalarRecord]) -> BTreeMap<&str, Vec<&ScalarRecord>> {
    let mut series: BTreeMap<&str, Vec<&ScalarRecord>> = BTreeMap::new();
    for record in records {
        series.entry(record.tag.as_str()).or_default().push(record);
    }
    series
}

/// `/`: one table row per run and tag with the latest value.
pub fn index_page(runs: &[(String, Vec<ScalarRecord>)]) -> String {
    let mut body = String::from("<h1>voxseg board</h1>");
    if runs.is_empty() {
        body.push_str("<p>No runs found in the log directory yet.</p>");
        return page("voxseg board", &body);
    }
    body.push_str("<table><tr><th>run</th><th>tag</th><th>points</th><th>latest step</th><th>latest value</th></tr>");
    for (run, records) in runs {
        let series = group_by_tag(records);
        if series.is_empty() {
            body.push_str(&format!(
                "<tr><td><a href=\"/runs/{0}\">{1}</a></td><td colspan=\"4\">no scalars yet</td></tr>",
                url_encode(run),
                escape(run)
            ));
        }
        for (tag, points) in series {
            if let Some(last) = points.last() {
                body.push_str(&format!(
                    "<tr><td><a href=\"/runs/{0}\">{1}</a></td><td>{2}</td><td>{3}</td><td>{4}</td><td>{5:.6}</td></tr>",
                    url_encode(run),
                    escape(run),
                    escape(tag),
                    points.len(),
                    last.step,
                    last.value
                ));
            }
        }
    }
    body.push_str("</table>");
    page("voxseg board", &body)
}

/// `/runs/<run>`: a chart per scalar tag and the latest image collection
/// per image tag.
pub fn run_page(run: &str, scalars: &[ScalarRecord], images: &[ImageRecord]) -> String {
    let mut body = format!("<p><a href=\"/\">&larr; all runs</a></p><h1>{}</h1>", escape(run));

    body.push_str("<h2>Scalars</h2>");
    for (tag, points) in group_by_tag(scalars) {
        body.push_str(&format!(
            "<h3>{0} <small>(<a href=\"/runs/{1}/scalars?tag={2}\">json</a>)</small></h3>{3}",
            escape(tag),
            url_encode(run),
            url_encode(tag),
            line_chart(&points)
        ));
    }

    let mut latest: BTreeMap<&str, u64> = BTreeMap::new();
    for record in images {
        let step = latest.entry(record.tag.as_str()).or_insert(record.step);
        *step = (*step).max(record.step);
    }
    if !latest.is_empty() {
        body.push_str("<h2>Images</h2>");
    }
    for (tag, step) in latest {
        body.push_str(&format!("<h3>{} <small>step {step}</small></h3><div class=\"imgs\">", escape(tag)));
        for record in images.iter().filter(|r| r.tag == tag && r.step == step) {
            body.push_str(&format!(
                "<img src=\"/runs/{}/{}\" alt=\"{} {}\">",
                url_encode(run),
                escape(&record.path),
                escape(tag),
                record.index
            ));
        }
        body.push_str("</div>");
    }
    page(run, &body)
}

fn line_chart(points: &[&ScalarRecord]) -> String {
    const W: f64 = 480.0;
    const H: f64 = 180.0;
    const PAD: f64 = 8.0;

    let finite: Vec<(f64, f64)> = points
        .iter()
        .filter(|p| p.value.is_finite())
        .map(|p| (p.step as f64, p.value))
        .collect();
    if finite.is_empty() {
        return String::from("<p>no finite values</p>");
    }
    let (x_min, x_max) = finite.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.0), hi.max(p.0)));
    let (y_min, y_max) = finite.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.1), hi.max(p.1)));
    let x_span = if x_max > x_min { x_max - x_min } else { 1.0 };
    let y_span = if y_max > y_min { y_max - y_min } else { 1.0 };

    let coords: Vec<String> = finite
        .iter()
        .map(|&(x, y)| {
            let px = PAD + (x - x_min) / x_span * (W - 2.0 * PAD);
            let py = H - PAD - (y - y_min) / y_span * (H - 2.0 * PAD);
            format!("{px:.1},{py:.1}")
        })
        .collect();

    format!(
        "<svg class=\"chart\" width=\"{W}\" height=\"{H}\" viewBox=\"0 0 {W} {H}\">\
         <polyline fill=\"none\" stroke=\"#e4572e\" stroke-width=\"1.5\" points=\"{}\"/>\
         <text x=\"{PAD}\" y=\"14\" font-size=\"11\">{y_max:.4}</text>\
         <text x=\"{PAD}\" y=\"{}\" font-size=\"11\">{y_min:.4}</text></svg>",
        coords.join(" "),
        H - PAD - 2.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(tag: &str, step: u64, value: f64) -> ScalarRecord {
        ScalarRecord { tag: tag.to_owned(), step, value, wall_time: 0.0 }
    }

    #[test]
    fn index_lists_latest_value_per_tag() {
        let runs = vec![(
            "1700000000_42".to_owned(),
            vec![scalar("Loss/train", 0, 0.9), scalar("Loss/train", 1, 0.7)],
        )];
        let html = index_page(&runs);
        assert!(html.contains("1700000000_42"));
        assert!(html.contains("0.700000"));
    }

    #[test]
    fn run_page_escapes_tags() {
        let html = run_page("r", &[scalar("<b>", 0, 1.0)], &[]);
        assert!(html.contains("&lt;b&gt;"));
        assert!(!html.contains("<b>"));
    }
}
