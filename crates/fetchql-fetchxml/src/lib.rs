//! Translates a parsed SELECT statement into FetchXML, classifying what can
//! be pushed into the query and what must be evaluated after retrieval.
//!
//! The generator never talks to a remote store; it is a pure function from
//! AST to XML text plus residual metadata. Date-range partitioning (used by
//! the parallel aggregate planner) is a separate, later splice step: see
//! [`inject_date_range_filter`].

mod filter;
mod generator;
mod virtual_column;
mod xml;

pub use generator::{generate, TranspileResult};
pub use virtual_column::{detect_virtual_base, VirtualColumnInfo};

use chrono::{DateTime, Utc};

/// Splices an additional `<condition>` pair bounding `createdon` (or the
/// caller-chosen partition attribute) between `start` (inclusive) and `end`
/// (exclusive) into an already-generated FetchXML document, by inserting
/// before the closing `</entity>` tag.
///
/// This exists for the parallel partitioned-aggregate plan node: the same
/// base FetchXML is reused across partitions, each with a different date
/// window spliced in, rather than re-running the generator per partition.
pub fn inject_date_range_filter(
    fetch_xml: &str,
    partition_attribute: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    let filter = xml::XmlElem::new("filter")
        .attr("type", "and")
        .child(
            xml::XmlElem::new("condition")
                .attr("attribute", partition_attribute.to_string())
                .attr("operator", "ge")
                .attr("value", format_fetchxml_datetime(start)),
        )
        .child(
            xml::XmlElem::new("condition")
                .attr("attribute", partition_attribute.to_string())
                .attr("operator", "lt")
                .attr("value", format_fetchxml_datetime(end)),
        )
        .render();

    match fetch_xml.rfind("</entity>") {
        Some(idx) => {
            let mut out = String::with_capacity(fetch_xml.len() + filter.len());
            out.push_str(&fetch_xml[..idx]);
            out.push_str(&filter);
            out.push_str(&fetch_xml[idx..]);
            out
        }
        None => fetch_xml.to_string(),
    }
}

fn format_fetchxml_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Splices a companion `aggregate="count"` attribute for an AVG column into
/// an already-generated aggregate FetchXML document, aliased `count_alias`.
/// The partitioned-aggregate plan needs each partition to report its own
/// count alongside its sum so the merge step can compute a true weighted
/// average instead of averaging partition averages.
pub fn inject_avg_count_companion(fetch_xml: &str, column: &str, count_alias: &str) -> String {
    let attribute = xml::XmlElem::new("attribute")
        .attr("name", column.to_string())
        .attr("aggregate", "count")
        .attr("alias", count_alias.to_string())
        .render();

    match fetch_xml.rfind("</entity>") {
        Some(idx) => {
            let mut out = String::with_capacity(fetch_xml.len() + attribute.len());
            out.push_str(&fetch_xml[..idx]);
            out.push_str(&attribute);
            out.push_str(&fetch_xml[idx..]);
            out
        }
        None => fetch_xml.to_string(),
    }
}
