//! Race track calculations over decoded moments.
//!
//! Moments arrive newest first, so the chronologically previous position of
//! `moments[i]` is `moments[i + 1]`. Distances are nautical miles, speeds
//! knots.

use crate::types::Moment;

// ---------------------------------------------------------------------------
// Geodesy
// ---------------------------------------------------------------------------

/// Distance and initial direction from one position to another.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Leg {
    /// Degrees true, 0 <= bearing < 360.
    pub bearing_deg: f64,
    pub dist_nm: f64,
}

/// Normalize a bearing into [0, 360).
pub fn normalize_bearing(deg: f64) -> f64 {
    let b = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negatives
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

/// Signed difference between two bearings, in (-180, 180].
pub fn diff_bearing(bearing: f64, reference: f64) -> f64 {
    let b = normalize_bearing(bearing) - normalize_bearing(reference);
    if b > 180.0 {
        b - 360.0
    } else if b <= -180.0 {
        b + 360.0
    } else {
        b
    }
}

/// Orthodrome distance and mid-latitude bearing between two positions.
///
/// One nautical mile is one minute of arc.
pub fn coord_diff(src_lat: f64, src_lon: f64, dst_lat: f64, dst_lon: f64) -> Leg {
    if src_lat == dst_lat && src_lon == dst_lon {
        return Leg::default();
    }

    let dlat = dst_lat - src_lat;
    let dlon = (dst_lon - src_lon) * ((src_lat + dst_lat) / 2.0).to_radians().cos();
    let bearing_deg = normalize_bearing(dlon.atan2(dlat).to_degrees());

    let (s_lat, d_lat) = (src_lat.to_radians(), dst_lat.to_radians());
    let cos_angle = s_lat.sin() * d_lat.sin()
        + s_lat.cos() * d_lat.cos() * (dst_lon - src_lon).to_radians().cos();
    let dist_nm = 60.0 * cos_angle.clamp(-1.0, 1.0).acos().to_degrees();

    Leg {
        bearing_deg,
        dist_nm,
    }
}

/// `coord_diff` between two moments.
pub fn moment_diff(src: &Moment, dst: &Moment) -> Leg {
    coord_diff(src.lat, src.lon, dst.lat, dst.lon)
}

// ---------------------------------------------------------------------------
// Time window
// ---------------------------------------------------------------------------

/// Drop moments outside `[t_min, t_max]` from the ends of a newest-first list.
///
/// Only the ends are trimmed: entries newer than `t_max` at the front and
/// entries older than `t_min` at the back.
pub fn clean_moments(moments: &mut Vec<Moment>, t_min: u32, t_max: u32) {
    while moments.last().is_some_and(|m| m.at < t_min) {
        moments.pop();
    }
    let future = moments.iter().take_while(|m| m.at > t_max).count();
    moments.drain(..future);
}

// ---------------------------------------------------------------------------
// Track analysis
// ---------------------------------------------------------------------------

/// Per-moment values relative to the chronologically previous moment.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LegStats {
    pub bearing_deg: f64,
    pub dist_nm: f64,
    /// Distance sailed from the oldest moment up to this one.
    pub dist_tot_nm: f64,
    pub td_secs: u32,
    pub v_avg_kts: f64,
}

/// Result of `analyze`, one `LegStats` per input moment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackAnalysis {
    pub legs: Vec<LegStats>,
    /// Seconds spent on legs at or above the minimum speed.
    pub t_move_secs: u64,
    /// Index of the leg with the highest average speed.
    pub max_speed_index: Option<usize>,
    /// `at` of the newest and oldest moment.
    pub span: Option<(u32, u32)>,
}

impl TrackAnalysis {
    pub fn total_distance_nm(&self) -> f64 {
        self.legs.first().map(|l| l.dist_tot_nm).unwrap_or(0.0)
    }

    /// Average speed over the full time span.
    pub fn average_speed_kts(&self) -> f64 {
        match self.span {
            Some((newest, oldest)) if newest > oldest => {
                self.total_distance_nm() * 3600.0 / (newest - oldest) as f64
            }
            _ => 0.0,
        }
    }

    /// Average speed over the time spent moving.
    pub fn moving_speed_kts(&self) -> f64 {
        if self.t_move_secs == 0 {
            return 0.0;
        }
        self.total_distance_nm() * 3600.0 / self.t_move_secs as f64
    }

    pub fn max_speed_kts(&self) -> f64 {
        self.max_speed_index
            .and_then(|i| self.legs.get(i))
            .map(|l| l.v_avg_kts)
            .unwrap_or(0.0)
    }
}

/// Compute distance, elapsed time, and average speed for each leg.
///
/// `min_avg_kts`: legs slower than this do not count as moving time.
pub fn analyze(moments: &[Moment], min_avg_kts: f64) -> TrackAnalysis {
    let n = moments.len();
    let mut legs = vec![LegStats::default(); n];
    let mut t_move_secs = 0u64;
    let mut max_speed_index = None;
    let mut max_speed = 0.0;

    for i in (1..n).rev() {
        let (older, newer) = (&moments[i], &moments[i - 1]);
        let leg = moment_diff(older, newer);
        let td_secs = newer.at.saturating_sub(older.at);
        let v_avg_kts = if td_secs > 0 {
            leg.dist_nm / td_secs as f64 * 3600.0
        } else {
            0.0
        };

        legs[i - 1] = LegStats {
            bearing_deg: leg.bearing_deg,
            dist_nm: leg.dist_nm,
            dist_tot_nm: legs[i].dist_tot_nm + leg.dist_nm,
            td_secs,
            v_avg_kts,
        };

        if v_avg_kts > max_speed {
            max_speed = v_avg_kts;
            max_speed_index = Some(i - 1);
        }
        if v_avg_kts >= min_avg_kts {
            t_move_secs += td_secs as u64;
        }
    }

    let span = match (moments.first(), moments.last()) {
        (Some(newest), Some(oldest)) => Some((newest.at, oldest.at)),
        _ => None,
    };

    TrackAnalysis {
        legs,
        t_move_secs,
        max_speed_index,
        span,
    }
}

// ---------------------------------------------------------------------------
// Course
// ---------------------------------------------------------------------------

/// A race course waypoint with its leg geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CourseNode {
    pub lat: f64,
    pub lon: f64,
    /// Bearing of the leg leaving this node; the finish keeps the bearing
    /// of the leg arriving at it.
    pub bearing_deg: f64,
    /// Length of the leg arriving at this node.
    pub dist_nm: f64,
    /// Course distance from the start to this node.
    pub dist_tot_nm: f64,
}

/// Intended route, nodes in sailing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Course {
    pub nodes: Vec<CourseNode>,
}

impl Course {
    /// Build a course from `(lat, lon)` waypoints.
    pub fn new(points: &[(f64, f64)]) -> Self {
        let mut nodes: Vec<CourseNode> = points
            .iter()
            .map(|&(lat, lon)| CourseNode {
                lat,
                lon,
                ..CourseNode::default()
            })
            .collect();

        for i in 1..nodes.len() {
            let (prev, node) = (nodes[i - 1], nodes[i]);
            let leg = coord_diff(prev.lat, prev.lon, node.lat, node.lon);
            nodes[i - 1].bearing_deg = leg.bearing_deg;
            nodes[i].bearing_deg = leg.bearing_deg;
            nodes[i].dist_nm = leg.dist_nm;
            nodes[i].dist_tot_nm = prev.dist_tot_nm + leg.dist_nm;
        }

        Course { nodes }
    }

    /// Total course length.
    pub fn distance_nm(&self) -> f64 {
        self.nodes.last().map(|n| n.dist_tot_nm).unwrap_or(0.0)
    }
}

/// True if a waypoint at `bearing_to_node` lies ahead of a boat following
/// a leg with `leg_bearing`, i.e. less than 90 degrees to either side.
pub fn coursepoint_in_sight(bearing_to_node: f64, leg_bearing: f64) -> bool {
    let v = diff_bearing(bearing_to_node, leg_bearing);
    v < 90.0 && v > -90.0
}

/// Position along the course for one moment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseProgress {
    /// Distance to finish along the course.
    pub dtf_nm: f64,
    /// Distance made good from the start.
    pub dmg_nm: f64,
}

/// Assign distance to finish and distance made good to each moment.
///
/// Walks the track oldest to newest while advancing through the course:
/// a moment is measured against the first remaining waypoint still ahead of
/// it. Moments past the last waypoint stay `None`.
pub fn calc_dtf(moments: &[Moment], course: &Course) -> Vec<Option<CourseProgress>> {
    let mut progress = vec![None; moments.len()];
    let total = course.distance_nm();

    // moments[..pending] are still unassigned, oldest at the end
    let mut pending = moments.len();
    // the start node is skipped; boats are measured against the next mark
    for node in course.nodes.iter().skip(1) {
        while pending > 0 {
            let m = &moments[pending - 1];
            let leg = coord_diff(m.lat, m.lon, node.lat, node.lon);
            if !coursepoint_in_sight(leg.bearing_deg, node.bearing_deg) {
                break;
            }
            progress[pending - 1] = Some(CourseProgress {
                dtf_nm: total - node.dist_tot_nm + leg.dist_nm,
                dmg_nm: node.dist_tot_nm - leg.dist_nm,
            });
            pending -= 1;
        }
        if pending == 0 {
            break;
        }
    }

    progress
}

// ---------------------------------------------------------------------------
// Distance runs
// ---------------------------------------------------------------------------

/// Window length of a daily run.
pub const DAY_SECS: u32 = 24 * 3600;

/// Window length of a weekly run.
pub const WEEK_SECS: u32 = 7 * DAY_SECS;

/// Relative tolerance a run's duration may deviate from its window.
pub const RUN_TOLERANCE: f64 = 0.01;

/// Distance sailed over (approximately) a fixed time window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceRun {
    /// Requested window length.
    pub window_secs: u32,
    /// Actual time covered by the run.
    pub t_secs: u32,
    pub dist_nm: f64,
    pub v_avg_kts: f64,
}

/// `0.0` if `a` is within `p` (relative) of `b`, else `a - b`.
pub fn approx(a: f64, b: f64, p: f64) -> f64 {
    if a < b * (1.0 - p) || a > b * (1.0 + p) {
        a - b
    } else {
        0.0
    }
}

/// Compute the distance covered in the window ending at each moment.
///
/// For every starting moment the track is followed forward in time until
/// the next moment would exceed `window_secs`. The run is kept only if its
/// duration is within `tolerance` of the window, and is attached to the
/// moment where it ends. When several runs end at the same moment, the
/// longest-lasting one wins. Leg distances come from `analysis`.
pub fn calc_tdist(
    moments: &[Moment],
    analysis: &TrackAnalysis,
    window_secs: u32,
    tolerance: f64,
) -> Vec<Option<DistanceRun>> {
    let n = moments.len();
    let mut runs: Vec<Option<DistanceRun>> = vec![None; n];
    if window_secs == 0 {
        return runs;
    }

    for i in (1..n).rev() {
        let start = moments[i].at;
        let mut dist_nm = 0.0;
        let mut elapsed: Option<u32> = None;

        for j in (0..i).rev() {
            let d = moments[j].at.saturating_sub(start);
            if d > window_secs {
                let Some(t_secs) = elapsed else {
                    break;
                };
                if t_secs == 0 || approx(t_secs as f64, window_secs as f64, tolerance) != 0.0 {
                    break;
                }
                let end = j + 1;
                match runs[end] {
                    Some(existing) if existing.t_secs >= t_secs => {}
                    _ => {
                        runs[end] = Some(DistanceRun {
                            window_secs,
                            t_secs,
                            dist_nm,
                            v_avg_kts: dist_nm / (t_secs as f64 / 3600.0),
                        })
                    }
                }
                break;
            }

            elapsed = Some(d);
            dist_nm += analysis.legs.get(j).map(|l| l.dist_nm).unwrap_or(0.0);
        }
    }

    runs
}

/// Longest distance among the computed runs.
pub fn best_run(runs: &[Option<DistanceRun>]) -> Option<DistanceRun> {
    runs.iter()
        .flatten()
        .copied()
        .max_by(|a, b| a.dist_nm.total_cmp(&b.dist_nm))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
