//! Listing pipeline: sort, score filter, pagination, and the stats rollup.
//!
//! Sorting is two-path. Raw metric columns can be ordered by a datastore
//! directly; the derived green score has no backing column, so those requests
//! materialize the full collection and sort in process.

use std::cmp::Ordering;

use serde::Serialize;

use crate::ports::domain::{Port, PortView};
use crate::ports::score::round2;

/// Fields a port listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    AirQuality,
    WaterQuality,
    Co2Emissions,
    Incidents,
    GreenScore,
}

impl SortField {
    /// Maps the `sort` query key to a field. Unknown keys fall back to the
    /// default name ordering.
    pub fn parse(key: &str) -> Self {
        match key {
            "air_quality" => Self::AirQuality,
            "water_quality" => Self::WaterQuality,
            "co2_emissions" => Self::Co2Emissions,
            "incidents" => Self::Incidents,
            "green_score" => Self::GreenScore,
            _ => Self::Name,
        }
    }

    /// The raw column backing this field, if one exists.
    pub const fn column(self) -> Option<PortColumn> {
        match self {
            Self::Name => Some(PortColumn::Name),
            Self::AirQuality => Some(PortColumn::AirQuality),
            Self::WaterQuality => Some(PortColumn::WaterQuality),
            Self::Co2Emissions => Some(PortColumn::Co2Emissions),
            Self::Incidents => Some(PortColumn::Incidents),
            Self::GreenScore => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Maps the `order` query key; anything other than `desc` is ascending.
    pub fn parse(key: &str) -> Self {
        if key == "desc" {
            Self::Descending
        } else {
            Self::Ascending
        }
    }
}

/// Columns a datastore can order by without deriving scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortColumn {
    Name,
    AirQuality,
    WaterQuality,
    Co2Emissions,
    Incidents,
}

impl PortColumn {
    pub fn compare(self, a: &Port, b: &Port) -> Ordering {
        match self {
            Self::Name => a.name.cmp(&b.name),
            Self::AirQuality => a.air_quality.total_cmp(&b.air_quality),
            Self::WaterQuality => a.water_quality.total_cmp(&b.water_quality),
            Self::Co2Emissions => a.co2_emissions.total_cmp(&b.co2_emissions),
            Self::Incidents => a.incidents.cmp(&b.incidents),
        }
    }
}

/// Stable sort on a raw column. Descending flips the comparator, so equal
/// keys keep their stored order in either direction.
pub fn sort_by_column(ports: &mut [Port], column: PortColumn, order: SortOrder) {
    ports.sort_by(|a, b| match order {
        SortOrder::Ascending => column.compare(a, b),
        SortOrder::Descending => column.compare(b, a),
    });
}

/// Stable sort on the derived green score.
pub fn sort_by_green_score(ports: &mut [Port], order: SortOrder) {
    ports.sort_by(|a, b| {
        let (left, right) = (a.green_score(), b.green_score());
        match order {
            SortOrder::Ascending => left.total_cmp(&right),
            SortOrder::Descending => right.total_cmp(&left),
        }
    });
}

/// One page of the port listing. `total` and `pages` describe the filtered
/// collection, not the unfiltered one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortPage {
    pub ports: Vec<PortView>,
    pub total: usize,
    pub pages: usize,
    pub current_page: usize,
}

/// Applies the score floor, then slices out the requested page.
///
/// Filtering happens before pagination so `total` and `pages` always count
/// the ports a client can actually page through. Out-of-range pages come
/// back with an empty item list rather than an error; a zero `per_page` is
/// treated as one item per page.
pub fn paginate(ports: Vec<Port>, min_score: Option<f64>, page: usize, per_page: usize) -> PortPage {
    let filtered: Vec<Port> = match min_score {
        Some(floor) => ports
            .into_iter()
            .filter(|port| port.green_score() >= floor)
            .collect(),
        None => ports,
    };

    let per_page = per_page.max(1);
    let total = filtered.len();
    // div_ceil keeps an oversized per_page from overflowing the page count.
    let pages = total.div_ceil(per_page);

    let items = match page.checked_sub(1) {
        Some(zero_based) => {
            let start = zero_based.saturating_mul(per_page);
            filtered
                .iter()
                .skip(start)
                .take(per_page)
                .map(PortView::from)
                .collect()
        }
        // Page zero sits before the first page; nothing to show.
        None => Vec::new(),
    };

    PortPage {
        ports: items,
        total,
        pages,
        current_page: page,
    }
}

/// Dashboard rollup across the whole collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortStats {
    pub total_ports: usize,
    pub avg_green_score: f64,
    pub top_polluted: Vec<PollutionRanking>,
    pub air_quality_trend: Vec<f64>,
    pub water_quality_trend: Vec<f64>,
    pub co2_trend: Vec<f64>,
    pub incidents_trend: Vec<u32>,
}

/// Entry in the worst-scores leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollutionRanking {
    pub name: String,
    pub score: f64,
}

const TOP_POLLUTED_LIMIT: usize = 5;

/// Aggregates stats over the collection in listing order. An empty
/// collection reports zeroed aggregates instead of dividing by zero.
pub fn compute_stats(ports: &[Port]) -> PortStats {
    if ports.is_empty() {
        return PortStats {
            total_ports: 0,
            avg_green_score: 0.0,
            top_polluted: Vec::new(),
            air_quality_trend: Vec::new(),
            water_quality_trend: Vec::new(),
            co2_trend: Vec::new(),
            incidents_trend: Vec::new(),
        };
    }

    let score_sum: f64 = ports.iter().map(Port::green_score).sum();

    let mut ranked: Vec<PollutionRanking> = ports
        .iter()
        .map(|port| PollutionRanking {
            name: port.name.clone(),
            score: port.green_score(),
        })
        .collect();
    ranked.sort_by(|a, b| a.score.total_cmp(&b.score));
    ranked.truncate(TOP_POLLUTED_LIMIT);

    PortStats {
        total_ports: ports.len(),
        avg_green_score: round2(score_sum / ports.len() as f64),
        top_polluted: ranked,
        air_quality_trend: ports.iter().map(|port| port.air_quality).collect(),
        water_quality_trend: ports.iter().map(|port| port.water_quality).collect(),
        co2_trend: ports.iter().map(|port| port.co2_emissions).collect(),
        incidents_trend: ports.iter().map(|port| port.incidents).collect(),
    }
}
