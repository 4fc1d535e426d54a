use anyhow::{Context, Result, anyhow, bail};
use reportkit_engine::filtering::{FieldInput, FormField};
use reportkit_engine::{FilterForm, FormOptions, Report, Submission};
use reportkit_runtime::Runtime;
use std::io::Write;
use std::path::PathBuf;

const EXTRAS_PREFIX: &str = "_extras_";

pub struct RenderRequest {
    pub report: String,
    pub format: String,
    pub filters: Vec<String>,
    pub order_by: Option<String>,
    pub group_by: Option<String>,
    pub output: Option<PathBuf>,
}

impl RenderRequest {
    fn refines(&self) -> bool {
        !self.filters.is_empty() || self.order_by.is_some() || self.group_by.is_some()
    }
}

pub fn handle(runtime: &Runtime, request: RenderRequest) -> Result<()> {
    let report = runtime.registry().build(&request.report)?;
    let report = if request.refines() {
        refine(&report, &request)?
    } else {
        report
    };

    let bytes = report.render(&request.format)?;
    match &request.output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(report = %request.report, path = %path.display(), bytes = bytes.len(), "report written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Push command-line filters, ordering and grouping through the report's
/// filter form, the same path an interactive submission takes.
fn refine(report: &Report, request: &RenderRequest) -> Result<Report> {
    let choice = |value: &Option<String>| -> Vec<(String, String)> {
        value.iter().map(|v| (v.clone(), v.clone())).collect()
    };
    let mut form = FilterForm::for_report(
        report,
        FormOptions {
            order_by: choice(&request.order_by),
            group_by: choice(&request.group_by),
            ..FormOptions::default()
        },
    );

    let mut submission = Submission::new();
    for raw in &request.filters {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid filter '{}': expected KEY=VALUE", raw))?;
        let key = key.trim().replace('.', "__");
        if key.starts_with(EXTRAS_PREFIX) && form.field(&key).is_none() {
            form = form.with_field(FormField::new(
                key.as_str(),
                key.as_str(),
                FieldInput::Passthrough,
            ));
        }
        let Some(field) = form.field(&key) else {
            let available: Vec<&str> = form.lookup_fields().map(|f| f.name.as_str()).collect();
            bail!(
                "Unknown filter '{}' for report '{}' (available: {})",
                key,
                request.report,
                if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                }
            );
        };
        let submitted = field.parse(value).map_err(|msg| anyhow!(msg))?;
        submission.set(key, submitted);
    }

    if let Some(order_by) = &request.order_by {
        submission.set("_report_order_by", order_by.as_str());
    }
    if let Some(group_by) = &request.group_by {
        match group_by.split_once(',') {
            Some((group, _)) if !group.trim().is_empty() => {}
            _ => bail!("Invalid --group-by '{}': expected GROUP,ORDER", group_by),
        }
        submission.set("_report_group_by", group_by.as_str());
    }

    Ok(form.translate(&submission).apply(report)?)
}
