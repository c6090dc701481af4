//! Track sources and point validation.
//!
//! A source yields whole tracks in import order. Parsers produce
//! [`RawTrackPoint`]s with optional fields; those are validated into
//! [`TrackPoint`]s before any track reaches the importer.

use std::collections::VecDeque;

use crate::error::{ConflationError, Result};
use crate::geo_utils::haversine_distance;
use crate::{Coordinate, TrackPoint};

/// One recorded track, points in timestamp order.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub points: Vec<TrackPoint>,
}

impl Track {
    pub fn new(id: impl Into<String>, points: Vec<TrackPoint>) -> Self {
        Self {
            id: id.into(),
            points,
        }
    }
}

/// Supplier of tracks, in the order they must be imported.
pub trait TrackSource {
    /// The next track, or `None` when the source is exhausted.
    fn next_track(&mut self) -> Option<Result<Track>>;
}

/// Tracks held in memory.
#[derive(Debug, Default)]
pub struct VecTrackSource {
    tracks: VecDeque<Track>,
}

impl VecTrackSource {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks: tracks.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl TrackSource for VecTrackSource {
    fn next_track(&mut self) -> Option<Result<Track>> {
        self.tracks.pop_front().map(Ok)
    }
}

// ============================================================================
// Raw points
// ============================================================================

/// A track point as read from a file, before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawTrackPoint {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Unix timestamp (seconds since epoch)
    pub timestamp: Option<i64>,
    /// Instantaneous speed in m/s, if the recorder supplied one
    pub instant_speed: Option<f64>,
}

impl RawTrackPoint {
    pub fn new(
        longitude: Option<f64>,
        latitude: Option<f64>,
        timestamp: Option<i64>,
        instant_speed: Option<f64>,
    ) -> Self {
        Self {
            longitude,
            latitude,
            timestamp,
            instant_speed,
        }
    }

    /// Validate every field. `index` is the point's position in its track.
    pub fn validate(&self, index: usize) -> Result<TrackPoint> {
        let (coordinate, timestamp) = self.validate_position(index)?;
        let speed = self
            .instant_speed
            .ok_or_else(|| ConflationError::malformed(index, "missing speed"))?;
        check_speed(index, speed)?;
        Ok(TrackPoint::new(
            coordinate.longitude,
            coordinate.latitude,
            timestamp,
            speed,
        ))
    }

    fn validate_position(&self, index: usize) -> Result<(Coordinate, i64)> {
        let (longitude, latitude) = match (self.longitude, self.latitude) {
            (Some(lon), Some(lat)) => (lon, lat),
            _ => return Err(ConflationError::malformed(index, "missing coordinate")),
        };
        let coordinate = Coordinate::new(longitude, latitude);
        if !coordinate.is_valid() {
            return Err(ConflationError::malformed(
                index,
                format!("invalid coordinate ({}, {})", longitude, latitude),
            ));
        }
        let timestamp = self
            .timestamp
            .ok_or_else(|| ConflationError::malformed(index, "missing timestamp"))?;
        Ok((coordinate, timestamp))
    }
}

/// Check an already-built point the way [`RawTrackPoint::validate`] would.
pub(crate) fn check_point(index: usize, point: &TrackPoint) -> Result<()> {
    let coordinate = point.coordinate();
    if !coordinate.is_valid() {
        return Err(ConflationError::malformed(
            index,
            format!(
                "invalid coordinate ({}, {})",
                coordinate.longitude, coordinate.latitude
            ),
        ));
    }
    check_speed(index, point.instant_speed)
}

fn check_speed(index: usize, speed: f64) -> Result<()> {
    if !speed.is_finite() || speed < 0.0 {
        return Err(ConflationError::malformed(
            index,
            format!("invalid speed {}", speed),
        ));
    }
    Ok(())
}

/// Validate raw points, deriving any missing speed from the timestamps.
///
/// Supplied speeds are kept as they are.
pub fn complete_speeds(raw: &[RawTrackPoint]) -> Result<Vec<TrackPoint>> {
    let positions = raw
        .iter()
        .enumerate()
        .map(|(i, p)| p.validate_position(i))
        .collect::<Result<Vec<_>>>()?;
    let derived = derive_speeds(&positions);

    raw.iter()
        .zip(positions)
        .zip(derived)
        .enumerate()
        .map(|(i, ((p, (coordinate, timestamp)), derived))| {
            let speed = match p.instant_speed {
                Some(speed) => {
                    check_speed(i, speed)?;
                    speed
                }
                None => derived,
            };
            Ok(TrackPoint::new(
                coordinate.longitude,
                coordinate.latitude,
                timestamp,
                speed,
            ))
        })
        .collect()
}

/// Instantaneous horizontal speed (m/s) at every sample.
///
/// Interior samples use the central difference between their neighbours;
/// the first and last use the one-sided difference. A non-positive time
/// delta gives 0.0.
pub fn derive_speeds(samples: &[(Coordinate, i64)]) -> Vec<f64> {
    let n = samples.len();
    if n < 2 {
        return vec![0.0; n];
    }

    (0..n)
        .map(|i| {
            let before = i.saturating_sub(1);
            let after = (i + 1).min(n - 1);
            let (a, ta) = &samples[before];
            let (b, tb) = &samples[after];
            let dt = (tb - ta) as f64;
            if dt <= 0.0 {
                0.0
            } else {
                haversine_distance(a, b) / dt
            }
        })
        .collect()
}

// ============================================================================
// GPX folders
// ============================================================================

#[cfg(feature = "gpx")]
pub use gpx_source::{read_gpx_track, GpxDirSource};

#[cfg(feature = "gpx")]
mod gpx_source {
    use std::fs::{self, File};
    use std::io::BufReader;
    use std::path::{Path, PathBuf};

    use log::debug;
    use time::OffsetDateTime;

    use super::{complete_speeds, RawTrackPoint, Track, TrackSource};
    use crate::error::{ConflationError, Result};

    /// Every `.gpx` file of a folder, one track per file, in filename order.
    #[derive(Debug)]
    pub struct GpxDirSource {
        files: std::vec::IntoIter<PathBuf>,
    }

    impl GpxDirSource {
        pub fn open(folder: &Path) -> Result<Self> {
            let mut files: Vec<PathBuf> = fs::read_dir(folder)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == "gpx"))
                .collect();
            files.sort();
            debug!("Found {} GPX files in {}", files.len(), folder.display());
            Ok(Self {
                files: files.into_iter(),
            })
        }

        pub fn remaining(&self) -> usize {
            self.files.len()
        }
    }

    impl TrackSource for GpxDirSource {
        fn next_track(&mut self) -> Option<Result<Track>> {
            self.files.next().map(|path| read_gpx_track(&path))
        }
    }

    /// Read all track segments of a GPX file as one track.
    ///
    /// Speeds are derived from consecutive timestamps.
    pub fn read_gpx_track(path: &Path) -> Result<Track> {
        let parse_error = |reason: String| ConflationError::TrackParse {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path)?;
        let gpx = gpx::read(BufReader::new(file)).map_err(|e| parse_error(e.to_string()))?;

        let mut raw = Vec::new();
        for track in &gpx.tracks {
            for segment in &track.segments {
                for pt in &segment.points {
                    let point = pt.point();
                    let timestamp = pt
                        .time
                        .clone()
                        .map(|t| OffsetDateTime::from(t).unix_timestamp());
                    raw.push(RawTrackPoint::new(
                        Some(point.x()),
                        Some(point.y()),
                        timestamp,
                        None,
                    ));
                }
            }
        }

        if raw.is_empty() {
            return Err(parse_error("no track points found".to_string()));
        }

        let id = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Track {
            id,
            points: complete_speeds(&raw)?,
        })
    }
}
