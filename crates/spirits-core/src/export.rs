//! Check-in export helpers shared by every front end.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::Model;

/// Export output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Markdown,
}

/// Render check-ins as pretty-printed JSON.
///
/// The output parses back into `Vec<Model>`, so another site can merge it.
pub fn render_json_export(models: &[Model]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(models)
}

/// Parse a JSON export produced by `render_json_export`
pub fn parse_json_export(input: &str) -> serde_json::Result<Vec<Model>> {
    serde_json::from_str(input)
}

/// Render check-ins in Markdown with a frontmatter block each.
#[must_use]
pub fn render_markdown_export(models: &[Model]) -> String {
    let mut output = String::new();

    for (index, model) in models.iter().enumerate() {
        if index > 0 {
            output.push('\n');
        }

        let drink = &model.check_in.drink;
        let _ = writeln!(output, "---");
        let _ = writeln!(output, "id: {}", model.id());
        let _ = writeln!(output, "time: {}", model.check_in.time.to_rfc3339());
        let _ = writeln!(output, "style: {}", drink.style);
        let _ = writeln!(output, "abv: {:.1}%", drink.abv * 100.0);
        let _ = writeln!(output, "volume: {}", drink.volume);
        if let Some(price) = drink.price {
            let _ = writeln!(output, "price: {price:.2}");
        }
        if let Some(external_id) = model.check_in.external_id {
            let _ = writeln!(output, "external_id: {external_id}");
        }
        if model.metadata.deleted {
            let _ = writeln!(output, "deleted: true");
        }
        let _ = writeln!(output, "---");
        let _ = writeln!(output);
        let title = drink.name.as_deref().unwrap_or(drink.style.as_str());
        let _ = writeln!(output, "# {title}");
    }

    output
}

/// Render check-ins in the selected format
pub fn render_export(models: &[Model], format: ExportFormat) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(models),
        ExportFormat::Markdown => Ok(render_markdown_export(models)),
    }
}
