use log::info;
use ndarray::{s, Array2, Array3};

use crate::algorithm::pca;
use crate::data::cube::{FlagCube, MapImage, SampleToMapIndex};
use crate::data::region::{LineAxis, LineFlag, RectRegion, RegionPolarity};
use crate::error::CoreError;
use crate::flagging::{lines, mapper, scan};
use crate::mapping::index::{self, MapGeometry, SampleIndex};

/// Single-letter commands of the interactive flagger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    NextScan,
    PrevScan,
    QuitSave,
    QuitNoSave,
    PointToMap,
    Footprint,
    ReverseRegions,
    Redraw,
    FlagMax,
    FlagMin,
    DeleteRegion,
    FlagTimepoint,
    FlagScan,
    UnflagScan,
    FlagBolometer,
    UnflagTimepoint,
    UnflagBolometer,
    ToggleZoom,
    ShowValue,
    ShowPca,
    BolometerMap,
}

impl Command {
    /// Map a keypress to its command. `w` duplicates `s` because some
    /// backends steal the `s` key.
    pub fn from_key(key: char) -> Option<Command> {
        match key {
            'n' => Some(Command::NextScan),
            'p' => Some(Command::PrevScan),
            'q' => Some(Command::QuitSave),
            'Q' => Some(Command::QuitNoSave),
            '.' => Some(Command::PointToMap),
            'f' => Some(Command::Footprint),
            'R' => Some(Command::ReverseRegions),
            'r' => Some(Command::Redraw),
            'M' => Some(Command::FlagMax),
            'm' => Some(Command::FlagMin),
            'd' => Some(Command::DeleteRegion),
            't' => Some(Command::FlagTimepoint),
            's' | 'w' => Some(Command::FlagScan),
            'S' => Some(Command::UnflagScan),
            'b' => Some(Command::FlagBolometer),
            'T' => Some(Command::UnflagTimepoint),
            'B' => Some(Command::UnflagBolometer),
            'c' => Some(Command::ToggleZoom),
            'v' => Some(Command::ShowValue),
            'P' => Some(Command::ShowPca),
            'o' => Some(Command::BolometerMap),
            _ => None,
        }
    }
}

/// Map viewport in `(row, col)` bounds, inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapViewport {
    pub rows: (usize, usize),
    pub cols: (usize, usize),
}

/// What a command did, for a UI layer to render. The session itself never
/// draws anything.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    None,
    Redraw,
    ScanChanged(usize),
    AtBoundary,
    Quit { save: bool },
    Viewport(MapViewport),
    Value {
        bolo: usize,
        time: usize,
        sample: f64,
        flag: i32,
    },
    MapPoint { row: usize, col: usize },
    Footprint(Vec<(usize, usize)>),
    /// Principal components of the current plane, one column per component.
    Pca(Array2<f64>),
    /// Map-shaped raster of one bolometer's samples.
    BoloMap(Array2<f64>),
}

/// Interactive flagging session: the loaded arrays, the current scan, and
/// the per-scan region and line lists that are the system of record for
/// every gesture the user has drawn.
pub struct FlagSession {
    pub samples: Array3<f64>,
    pub flags: FlagCube,
    pub map: MapImage,
    pub ts_to_map: SampleToMapIndex,
    pub scannum: usize,
    pub zoom_current: bool,
    geometry: MapGeometry,
    rectangles: Vec<Vec<RectRegion>>,
    lines: Vec<Vec<LineFlag>>,
}

impl FlagSession {
    pub fn new(
        samples: Array3<f64>,
        flags: FlagCube,
        map: MapImage,
        ts_to_map: SampleToMapIndex,
    ) -> Result<Self, CoreError> {
        flags.check_shape(samples.dim())?;
        ts_to_map.check_shape(samples.dim())?;
        let nscans = samples.dim().0;
        info!("session opened with {} scans", nscans);
        let geometry = MapGeometry::of(&map);
        Ok(FlagSession {
            samples,
            flags,
            map,
            ts_to_map,
            scannum: 0,
            zoom_current: false,
            geometry,
            rectangles: vec![Vec::new(); nscans],
            lines: vec![Vec::new(); nscans],
        })
    }

    pub fn nscans(&self) -> usize {
        self.samples.dim().0
    }

    pub fn scanlen(&self) -> usize {
        self.samples.dim().1
    }

    pub fn nbolos(&self) -> usize {
        self.samples.dim().2
    }

    pub fn geometry(&self) -> MapGeometry {
        self.geometry
    }

    pub fn regions(&self, scan: usize) -> &[RectRegion] {
        &self.rectangles[scan]
    }

    pub fn line_flags(&self, scan: usize) -> &[LineFlag] {
        &self.lines[scan]
    }

    /// Current scan's samples with flagged cells zeroed, the plane the UI
    /// displays and the extremum commands search.
    pub fn plane(&self) -> Array2<f64> {
        let mut plane = self.samples.slice(s![self.scannum, .., ..]).to_owned();
        let flags = self.flags.data.slice(s![self.scannum, .., ..]);
        plane.zip_mut_with(&flags, |v, &f| {
            if f != 0 {
                *v = 0.0;
            }
        });
        plane
    }

    /// Apply a drag gesture: build the region, mutate the flag cube, and
    /// record the region for later hit-testing and removal.
    pub fn drag(&mut self, press: (f64, f64), release: (f64, f64), polarity: RegionPolarity) {
        let region = RectRegion::from_corners(
            press,
            release,
            polarity,
            self.scannum,
            self.scanlen(),
            self.nbolos(),
        );
        mapper::apply_region(&mut self.flags, &region);
        self.rectangles[self.scannum].push(region);
    }

    /// Delete the first recorded region containing the cursor. Returns
    /// whether a region was removed.
    pub fn delete_region_at(&mut self, x: f64, y: f64) -> bool {
        let list = &mut self.rectangles[self.scannum];
        if let Some(pos) = list.iter().position(|r| r.contains(x, y)) {
            let region = list.remove(pos);
            mapper::delete_region(&mut self.flags, &region);
            true
        } else {
            false
        }
    }

    /// Reverse the region list so regions hidden underneath are hit first.
    pub fn reverse_regions(&mut self) {
        self.rectangles[self.scannum].reverse();
    }

    pub fn flag_bolometer(&mut self, x: f64) {
        let bolo = Self::clamp_coord(x, self.nbolos());
        let line = lines::flag_bolometer(&mut self.flags, self.scannum, bolo);
        self.lines[self.scannum].push(line);
    }

    pub fn flag_timepoint(&mut self, y: f64) {
        let time = Self::clamp_coord(y, self.scanlen());
        let line = lines::flag_timepoint(&mut self.flags, self.scannum, time);
        self.lines[self.scannum].push(line);
    }

    pub fn unflag_bolometer(&mut self, x: f64) {
        let bolo = Self::clamp_coord(x, self.nbolos());
        self.lines[self.scannum].retain(|l| !l.matches(LineAxis::Bolometer, bolo));
        lines::unflag_bolometer(&mut self.flags, self.scannum, bolo);
    }

    pub fn unflag_timepoint(&mut self, y: f64) {
        let time = Self::clamp_coord(y, self.scanlen());
        self.lines[self.scannum].retain(|l| !l.matches(LineAxis::Time, time));
        lines::unflag_timepoint(&mut self.flags, self.scannum, time);
    }

    pub fn flag_whole_scan(&mut self) {
        // scannum is kept in range by navigation
        let _ = scan::flag_scan(&mut self.flags, self.scannum);
    }

    pub fn unflag_whole_scan(&mut self) {
        let _ = scan::unflag_scan(&mut self.flags, self.scannum);
    }

    /// Flag the highest (or lowest) unflagged sample of the current plane.
    pub fn flag_extremum(&mut self, maximum: bool) {
        let scan = self.scannum;
        let flags = self.flags.data.slice(s![scan, .., ..]);
        let samples = self.samples.slice(s![scan, .., ..]);

        let mut best: Option<((usize, usize), f64)> = None;
        for ((pos, &v), &f) in samples.indexed_iter().zip(flags.iter()) {
            if f != 0 {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, b)) => {
                    if maximum {
                        v > b
                    } else {
                        v < b
                    }
                }
            };
            if better {
                best = Some((pos, v));
            }
        }
        if let Some(((time, bolo), _)) = best {
            mapper::flag_point(&mut self.flags, scan, time, bolo);
        }
    }

    pub fn value_at(&self, x: f64, y: f64) -> (f64, i32) {
        let bolo = Self::clamp_coord(x, self.nbolos());
        let time = Self::clamp_coord(y, self.scanlen());
        (
            self.samples[[self.scannum, time, bolo]],
            self.flags.data[[self.scannum, time, bolo]],
        )
    }

    /// Map position a sample of the current scan projects onto.
    pub fn map_position_of(&self, time: usize, bolo: usize) -> (usize, usize) {
        self.geometry
            .unflatten(self.ts_to_map.data[[self.scannum, time, bolo]])
    }

    /// Samples of the current scan that project onto a map pixel.
    pub fn samples_at_map_point(&self, row: usize, col: usize) -> Vec<SampleIndex> {
        index::samples_at_pixel(
            &self.ts_to_map,
            self.geometry,
            row,
            col,
            Some(self.scannum),
        )
    }

    /// Principal components of the current plane, flagged cells zeroed.
    pub fn plane_components(&self) -> Array2<f64> {
        pca::principal_components(&self.plane())
    }

    /// Per-pixel average map of one bolometer's samples across all scans.
    pub fn bolometer_map(&self, x: f64) -> Array2<f64> {
        let bolo = Self::clamp_coord(x, self.nbolos());
        index::bolometer_map(&self.samples, &self.ts_to_map, self.geometry, bolo)
    }

    /// Toggle between the full map and the current scan's extent.
    pub fn toggle_zoom(&mut self) -> MapViewport {
        self.zoom_current = !self.zoom_current;
        if self.zoom_current {
            let (rows, cols) = index::scan_extent(&self.ts_to_map, self.geometry, self.scannum);
            MapViewport { rows, cols }
        } else {
            MapViewport {
                rows: (0, self.geometry.height.saturating_sub(1)),
                cols: (0, self.geometry.width.saturating_sub(1)),
            }
        }
    }

    /// Dispatch a command, with the cursor position in sample coordinates
    /// (`x` bolometer, `y` time) for the commands that need one. Cursor
    /// commands without a cursor do nothing, matching the original's
    /// out-of-axes guard.
    pub fn apply(&mut self, command: Command, cursor: Option<(f64, f64)>) -> SessionEvent {
        match command {
            Command::NextScan => {
                if self.scannum + 1 < self.nscans() {
                    self.scannum += 1;
                    SessionEvent::ScanChanged(self.scannum)
                } else {
                    SessionEvent::AtBoundary
                }
            }
            Command::PrevScan => {
                if self.scannum > 0 {
                    self.scannum -= 1;
                    SessionEvent::ScanChanged(self.scannum)
                } else {
                    SessionEvent::AtBoundary
                }
            }
            Command::QuitSave => SessionEvent::Quit { save: true },
            Command::QuitNoSave => SessionEvent::Quit { save: false },
            Command::Redraw => SessionEvent::Redraw,
            Command::ReverseRegions => {
                self.reverse_regions();
                SessionEvent::None
            }
            Command::FlagScan => {
                self.flag_whole_scan();
                SessionEvent::Redraw
            }
            Command::UnflagScan => {
                self.unflag_whole_scan();
                SessionEvent::Redraw
            }
            Command::FlagMax => {
                self.flag_extremum(true);
                SessionEvent::Redraw
            }
            Command::FlagMin => {
                self.flag_extremum(false);
                SessionEvent::Redraw
            }
            Command::ToggleZoom => SessionEvent::Viewport(self.toggle_zoom()),
            Command::FlagBolometer => match cursor {
                Some((x, _)) => {
                    self.flag_bolometer(x);
                    SessionEvent::Redraw
                }
                None => SessionEvent::None,
            },
            Command::UnflagBolometer => match cursor {
                Some((x, _)) => {
                    self.unflag_bolometer(x);
                    SessionEvent::Redraw
                }
                None => SessionEvent::None,
            },
            Command::FlagTimepoint => match cursor {
                Some((_, y)) => {
                    self.flag_timepoint(y);
                    SessionEvent::Redraw
                }
                None => SessionEvent::None,
            },
            Command::UnflagTimepoint => match cursor {
                Some((_, y)) => {
                    self.unflag_timepoint(y);
                    SessionEvent::Redraw
                }
                None => SessionEvent::None,
            },
            Command::DeleteRegion => match cursor {
                Some((x, y)) => {
                    if self.delete_region_at(x, y) {
                        SessionEvent::Redraw
                    } else {
                        SessionEvent::None
                    }
                }
                None => SessionEvent::None,
            },
            Command::ShowValue => match cursor {
                Some((x, y)) => {
                    let bolo = Self::clamp_coord(x, self.nbolos());
                    let time = Self::clamp_coord(y, self.scanlen());
                    let (sample, flag) = self.value_at(x, y);
                    SessionEvent::Value {
                        bolo,
                        time,
                        sample,
                        flag,
                    }
                }
                None => SessionEvent::None,
            },
            Command::PointToMap => match cursor {
                Some((x, y)) => {
                    let bolo = Self::clamp_coord(x, self.nbolos());
                    let time = Self::clamp_coord(y, self.scanlen());
                    let (row, col) = self.map_position_of(time, bolo);
                    SessionEvent::MapPoint { row, col }
                }
                None => SessionEvent::None,
            },
            Command::ShowPca => SessionEvent::Pca(self.plane_components()),
            Command::BolometerMap => match cursor {
                Some((x, _)) => SessionEvent::BoloMap(self.bolometer_map(x)),
                None => SessionEvent::None,
            },
            Command::Footprint => match cursor {
                Some((_, y)) => {
                    let time = Self::clamp_coord(y, self.scanlen());
                    SessionEvent::Footprint(index::footprint(
                        &self.ts_to_map,
                        self.geometry,
                        self.scannum,
                        time,
                    ))
                }
                None => SessionEvent::None,
            },
        }
    }

    fn clamp_coord(c: f64, len: usize) -> usize {
        (c.round().max(0.0) as usize).min(len.saturating_sub(1))
    }
}
