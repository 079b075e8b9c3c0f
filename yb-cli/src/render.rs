//! Output rendering: JSON arrays and per-vessel summary tables.

use std::io::Write;

use anyhow::Result;
use comfy_table::{Cell, Table};
use serde::Serialize;

use yb_core::config::FieldSet;
use yb_core::racemath::{CourseProgress, DistanceRun};
use yb_core::{Moment, TrackAnalysis, VesselBlock};

/// The four moment fields emitted by the reference tool.
#[derive(Debug, Serialize)]
struct ReferenceMoment {
    #[serde(skip_serializing_if = "Option::is_none")]
    dtf: Option<i32>,
    lat: f64,
    lon: f64,
    at: u32,
}

impl From<&Moment> for ReferenceMoment {
    fn from(m: &Moment) -> Self {
        ReferenceMoment {
            dtf: m.dtf,
            lat: m.lat,
            lon: m.lon,
            at: m.at,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReferenceBlock {
    id: u16,
    moments: Vec<ReferenceMoment>,
}

/// Write the decoded blocks as a JSON array.
pub fn write_json<W: Write>(
    mut out: W,
    blocks: &[VesselBlock],
    fields: FieldSet,
    pretty: bool,
) -> Result<()> {
    match fields {
        FieldSet::Full => write_value(&mut out, &blocks, pretty)?,
        FieldSet::Reference => {
            let reduced: Vec<ReferenceBlock> = blocks
                .iter()
                .map(|b| ReferenceBlock {
                    id: b.id,
                    moments: b.moments.iter().map(ReferenceMoment::from).collect(),
                })
                .collect();
            write_value(&mut out, &reduced, pretty)?
        }
    }
    writeln!(out)?;
    Ok(())
}

fn write_value<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(out, value)?;
    } else {
        serde_json::to_writer(out, value)?;
    }
    Ok(())
}

/// One vessel's line in the summary table.
pub struct SummaryRow<'a> {
    pub block: &'a VesselBlock,
    pub analysis: TrackAnalysis,
    /// Best 24 hour run.
    pub day: Option<DistanceRun>,
    /// Best 7 day run.
    pub week: Option<DistanceRun>,
    /// Latest moment measured against the course, if one was given.
    pub progress: Option<CourseProgress>,
}

fn dash() -> String {
    "-".into()
}

fn run_cell(run: Option<DistanceRun>) -> Cell {
    Cell::new(run.map(|r| format!("{:.1}", r.dist_nm)).unwrap_or_else(dash))
}

/// Build the per-vessel summary table.
pub fn summary_table(rows: &[SummaryRow<'_>]) -> Table {
    let with_course = rows.iter().any(|r| r.progress.is_some());

    let mut header = vec![
        "Vessel", "Moments", "First", "Last", "Dist (nm)", "Avg (kts)", "Moving (kts)",
        "Max (kts)", "Moving (h)", "24h (nm)", "7d (nm)", "DTF",
    ];
    if with_course {
        header.extend(["Course DTF (nm)", "DMG (nm)"]);
    }

    let mut table = Table::new();
    table.set_header(header);

    for row in rows {
        let (block, a) = (row.block, &row.analysis);
        let mut cells = vec![
            Cell::new(block.id),
            Cell::new(block.len()),
            Cell::new(block.earliest().map(|m| m.at.to_string()).unwrap_or_else(dash)),
            Cell::new(block.latest().map(|m| m.at.to_string()).unwrap_or_else(dash)),
            Cell::new(format!("{:.1}", a.total_distance_nm())),
            Cell::new(format!("{:.2}", a.average_speed_kts())),
            Cell::new(format!("{:.2}", a.moving_speed_kts())),
            Cell::new(format!("{:.2}", a.max_speed_kts())),
            Cell::new(format!("{:.1}", a.t_move_secs as f64 / 3600.0)),
            run_cell(row.day),
            run_cell(row.week),
            Cell::new(
                block
                    .latest()
                    .and_then(|m| m.dtf)
                    .map(|d| d.to_string())
                    .unwrap_or_else(dash),
            ),
        ];
        if with_course {
            let (dtf, dmg) = match row.progress {
                Some(p) => (format!("{:.1}", p.dtf_nm), format!("{:.1}", p.dmg_nm)),
                None => (dash(), dash()),
            };
            cells.extend([Cell::new(dtf), Cell::new(dmg)]);
        }
        table.add_row(cells);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> VesselBlock {
        VesselBlock {
            id: 1,
            moments: vec![Moment {
                dtf: None,
                lat: 1.23456,
                lon: -0.00016,
                at: 105,
                lap: None,
                alt: Some(12),
                pc: Some(0.5),
            }],
        }
    }

    fn render(fields: FieldSet, pretty: bool) -> String {
        let mut out = Vec::new();
        write_json(&mut out, &[block()], fields, pretty).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_reference_subset() {
        assert_eq!(
            render(FieldSet::Reference, false),
            "[{\"id\":1,\"moments\":[{\"lat\":1.23456,\"lon\":-0.00016,\"at\":105}]}]\n"
        );
    }

    #[test]
    fn test_full_fields() {
        let json = render(FieldSet::Full, false);
        assert!(json.contains("\"alt\":12"));
        assert!(json.contains("\"pc\":0.5"));
        assert!(!json.contains("\"lap\""));
    }

    #[test]
    fn test_pretty_parses_back() {
        let json = render(FieldSet::Reference, true);
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v[0]["moments"][0]["at"], 105);
    }

    #[test]
    fn test_empty_array() {
        let mut out = Vec::new();
        write_json(&mut out, &[], FieldSet::Reference, false).unwrap();
        assert_eq!(out, b"[]\n");
    }

    fn row(b: &VesselBlock) -> SummaryRow<'_> {
        SummaryRow {
            block: b,
            analysis: yb_core::analyze(&b.moments, 0.0),
            day: None,
            week: None,
            progress: None,
        }
    }

    #[test]
    fn test_summary_table_row() {
        let b = block();
        let text = summary_table(&[row(&b)]).to_string();
        assert!(text.contains("Vessel"));
        assert!(text.contains("24h (nm)"));
        assert!(text.contains("105"));
        assert!(!text.contains("DMG"));
    }

    #[test]
    fn test_summary_table_runs_and_course() {
        let b = block();
        let mut r = row(&b);
        r.day = Some(DistanceRun {
            window_secs: 86400,
            t_secs: 86400,
            dist_nm: 212.44,
            v_avg_kts: 8.85,
        });
        r.progress = Some(CourseProgress {
            dtf_nm: 1520.06,
            dmg_nm: 33.3,
        });
        let text = summary_table(&[r]).to_string();
        assert!(text.contains("212.4"));
        assert!(text.contains("Course DTF (nm)"));
        assert!(text.contains("1520.1"));
        assert!(text.contains("33.3"));
    }
}
