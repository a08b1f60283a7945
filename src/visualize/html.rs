//! HTML rendering of visualization data
//!
//! The document is static: client bands and lattices are rendered as tables,
//! and the full data is embedded as JSON for external tooling.

use std::io::Write;

use super::data::{ClientBand, Lattice, PartitionView, VisualizationData};
use super::VisualizeError;

const STYLE: &str = "body{font-family:monospace;margin:2em}\
table{border-collapse:collapse;margin-bottom:1.5em}\
td,th{border:1px solid #999;padding:2px 8px;text-align:left}\
.linearized{background:#dfd}.pending,.superseded{color:#a60}\
.rejected{color:#b00}.revisited{color:#777}.unresolved{font-style:italic;color:#b00}";

/// Write `data` as a self-contained HTML document
pub fn render<W: Write>(data: &VisualizationData, out: &mut W) -> Result<(), VisualizeError> {
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html><head><meta charset=\"utf-8\">")?;
    writeln!(out, "<title>Linearizability check: {}</title>", data.result)?;
    writeln!(out, "<style>{}</style></head><body>", STYLE)?;
    writeln!(out, "<h1>Result: {}</h1>", data.result)?;

    writeln!(out, "<h2>History</h2>")?;
    for band in &data.clients {
        render_band(band, out)?;
    }

    for partition in &data.partitions {
        render_partition(partition, out)?;
    }

    // "</" inside the JSON would end the script element early
    let json = serde_json::to_string(data)?.replace("</", "<\\/");
    writeln!(
        out,
        "<script type=\"application/json\" id=\"linearize-data\">{}</script>",
        json
    )?;
    writeln!(out, "</body></html>")?;
    Ok(())
}

fn render_band<W: Write>(band: &ClientBand, out: &mut W) -> Result<(), VisualizeError> {
    writeln!(out, "<h3>Client {}</h3>", band.client_id)?;
    writeln!(
        out,
        "<table><tr><th>id</th><th>partition</th><th>call</th><th>return</th><th>operation</th></tr>"
    )?;
    for op in &band.operations {
        let status = serde_json::to_value(op.status)?;
        let mut class = status.as_str().unwrap_or_default().to_string();
        if op.linearized {
            class.push_str(" linearized");
        }
        let returned = match op.return_index {
            Some(index) => index.to_string(),
            None => "-".to_string(),
        };
        writeln!(
            out,
            "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            class,
            op.id,
            op.partition,
            op.call_index,
            returned,
            escape(&op.description)
        )?;
    }
    writeln!(out, "</table>")?;
    Ok(())
}

fn render_partition<W: Write>(partition: &PartitionView, out: &mut W) -> Result<(), VisualizeError> {
    writeln!(
        out,
        "<h2>Partition {}: {}</h2>",
        partition.index, partition.result
    )?;
    if let Some(lattice) = &partition.lattice {
        let path: Vec<String> = partition.path.iter().map(|id| id.to_string()).collect();
        writeln!(out, "<p>Deepest partial linearization: [{}]</p>", path.join(", "))?;
        render_lattice(lattice, out)?;
    }
    Ok(())
}

fn render_lattice<W: Write>(lattice: &Lattice, out: &mut W) -> Result<(), VisualizeError> {
    writeln!(out, "<table><tr><th>node</th><th>position</th><th>state</th></tr>")?;
    for (index, node) in lattice.nodes.iter().enumerate() {
        match &node.state {
            Some(state) => writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                index,
                node.position,
                escape(state)
            )?,
            None => writeln!(
                out,
                "<tr class=\"unresolved\"><td>{}</td><td>{}</td><td>unresolved</td></tr>",
                index, node.position
            )?,
        }
    }
    writeln!(out, "</table>")?;

    writeln!(
        out,
        "<table><tr><th>from</th><th>to</th><th>op</th><th>step</th><th>outcome</th></tr>"
    )?;
    for edge in &lattice.edges {
        let outcome = serde_json::to_value(edge.outcome)?;
        let outcome = outcome.as_str().unwrap_or_default();
        writeln!(
            out,
            "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            outcome,
            edge.from,
            edge.to,
            edge.op,
            escape(&edge.description),
            outcome
        )?;
    }
    writeln!(out, "</table>")?;
    Ok(())
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
