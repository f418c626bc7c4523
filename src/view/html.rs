//! Standalone HTML page for a `Dashboard`, drawn client-side by Plotly.js.
//!
//! The page itself is a tera template with HTML autoescaping; only the
//! Plotly figures go in unescaped, as script-safe JSON.

use crate::pipeline::{Dashboard, Notice, Section};
use crate::view::{ChartKind, ChartSpec};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::Path;
use tera::Tera;
use tracing::info;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
const PAGE_TITLE: &str = "Company Financial Dashboard";
const TEMPLATE_NAME: &str = "dashboard.html";
const TEMPLATE: &str = include_str!("../../templates/dashboard.html.tera");

#[derive(Serialize)]
struct Page<'a> {
    title: &'static str,
    plotly_cdn: &'static str,
    ticker: &'a str,
    news_link: &'a str,
    sections: Vec<PageSection<'a>>,
}

#[derive(Serialize)]
struct PageSection<'a> {
    id: &'static str,
    heading: String,
    notices: Vec<&'a Notice>,
    /// Script-safe figure JSON; `None` when the section has no chart.
    figure: Option<String>,
}

/// Plotly figure (`{data, layout}`) for one chart spec.
pub fn plotly_figure(chart: &ChartSpec) -> Value {
    let traces: Vec<Value> = chart
        .series
        .iter()
        .map(|series| {
            let x: Vec<String> = series.points.iter().map(|p| p.x.to_string()).collect();
            let y: Vec<Option<f64>> = series.points.iter().map(|p| p.y).collect();
            match chart.kind {
                ChartKind::Line => json!({
                    "type": "scatter",
                    "mode": "lines",
                    "name": series.name,
                    "x": x,
                    "y": y,
                }),
                ChartKind::GroupedBar => json!({
                    "type": "bar",
                    "name": series.name,
                    "x": x,
                    "y": y,
                }),
            }
        })
        .collect();

    let mut layout = json!({
        "title": { "text": chart.title },
        "xaxis": { "title": { "text": chart.x_label } },
        "yaxis": { "title": { "text": chart.y_label } },
    });
    if chart.kind == ChartKind::GroupedBar {
        layout["barmode"] = json!("group");
    }

    json!({ "data": traces, "layout": layout })
}

pub fn render_page(dashboard: &Dashboard) -> Result<String> {
    let ticker = dashboard.ticker.as_str();
    let sections = vec![
        PageSection {
            id: "price-chart",
            heading: format!("Stock Price of {}", ticker),
            notices: dashboard.notices_for(Section::Price).collect(),
            figure: dashboard.price_chart.as_ref().map(script_json).transpose()?,
        },
        PageSection {
            id: "financials-chart",
            heading: format!("{} Financials for {}", dashboard.statement.label(), ticker),
            notices: dashboard.notices_for(Section::Financials).collect(),
            figure: dashboard.financials_chart.as_ref().map(script_json).transpose()?,
        },
    ];
    let page = Page {
        title: PAGE_TITLE,
        plotly_cdn: PLOTLY_CDN,
        ticker,
        news_link: dashboard.news_link.as_str(),
        sections,
    };

    let context = tera::Context::from_serialize(&page).context("Failed to build page context")?;
    templates()?
        .render(TEMPLATE_NAME, &context)
        .context("Failed to render dashboard page")
}

pub fn write_page(dashboard: &Dashboard, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let page = render_page(dashboard)?;
    std::fs::write(path, page).with_context(|| format!("Failed to write {:?}", path))?;
    info!("{}: dashboard written to {:?}", dashboard.ticker, path);
    Ok(())
}

fn templates() -> Result<Tera> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![".html"]);
    tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)
        .context("Invalid dashboard template")?;
    Ok(tera)
}

/// Figure JSON that is safe inside a `<script>` element.
fn script_json(chart: &ChartSpec) -> Result<String> {
    let json = serde_json::to_string(&plotly_figure(chart)).context("Failed to serialise chart")?;
    Ok(json.replace('<', "\\u003c"))
}
