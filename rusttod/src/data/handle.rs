use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::warn;
use regex::Regex;

use todcore::data::cube::{
    FlagCube, MapImage, SampleToMapIndex, TimestreamComponents, TimestreamSignal,
};
use todcore::error::CoreError;
use todcore::session::FlagSession;

use crate::data::container::{load_flags_file, save_flags_file};
use crate::data::header::HeaderCard;
use crate::data::savefile::SaveFile;
use crate::error::TodIoError;

/// Source of a flaggable dataset. Sessions are built through this seam so
/// the flagging core never sees a byte of any on-disk format.
pub trait TimestreamData {
    fn load(&self) -> Result<FlagDataset, TodIoError>;
    fn save_flags(&self, flags: &FlagCube) -> Result<(), TodIoError>;
}

/// Everything a flagging session needs, decoded and shape-checked.
pub struct FlagDataset {
    pub components: TimestreamComponents,
    pub flags: FlagCube,
    pub map: MapImage,
    pub ts_to_map: SampleToMapIndex,
    pub header: Vec<HeaderCard>,
}

impl FlagDataset {
    /// Build a session showing the given derived signal.
    pub fn into_session(self, signal: TimestreamSignal) -> Result<FlagSession, CoreError> {
        let samples = self.components.select(signal);
        FlagSession::new(samples, self.flags, self.map, self.ts_to_map)
    }
}

fn layout_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9]{6}_o[0-9b][0-9]_raw_ds5\.nc)(_indiv[0-9]{1,2}pca)")
            .expect("layout pattern compiles")
    })
}

fn map_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]{2})\.(tods|fits)").expect("layout pattern compiles"))
}

/// Filename layout of one reduced dataset, e.g.
/// `050906_o11_raw_ds5.nc_indiv13pca_timestream00.tods`. The first group is
/// the raw-container name the reduction started from, the full match is the
/// prefix every sibling file shares.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetLayout {
    pub file_prefix: String,
    pub dataset: String,
    pub map_number: String,
}

impl DatasetLayout {
    pub fn parse(filename: &str) -> Result<DatasetLayout, TodIoError> {
        let captures = layout_regex()
            .captures(filename)
            .ok_or_else(|| TodIoError::FilenamePattern(filename.to_string()))?;
        let map_number = map_number_regex()
            .captures(filename)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "01".to_string());
        Ok(DatasetLayout {
            file_prefix: captures[0].to_string(),
            dataset: captures[1].to_string(),
            map_number,
        })
    }

    pub fn timestream_name(&self) -> String {
        format!("{}_timestream00.tods", self.file_prefix)
    }

    pub fn map_name(&self) -> String {
        format!("{}_map{}.tods", self.file_prefix, self.map_number)
    }

    pub fn tstomap_name(&self) -> String {
        format!("{}_tstomap.tods", self.file_prefix)
    }

    pub fn flags_name(&self) -> String {
        format!("{}_flags.todf", self.file_prefix)
    }
}

/// A structured save container on disk plus its flags sibling.
///
/// Flag edits are written next to the container rather than back into it,
/// so the reduced data is never rewritten. When a flags sibling already
/// exists it wins over the flags section inside the container.
pub struct SaveFileHandle {
    save_path: PathBuf,
    flags_path: PathBuf,
    pub layout: DatasetLayout,
}

impl SaveFileHandle {
    /// Open a handle on a save container. The filename must follow the
    /// dataset layout, otherwise nothing else can be located.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SaveFileHandle, TodIoError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TodIoError::FilenamePattern(path.display().to_string()))?;
        let layout = DatasetLayout::parse(name)?;
        let flags_path = path.with_file_name(layout.flags_name());
        Ok(SaveFileHandle {
            save_path: path.to_path_buf(),
            flags_path,
            layout,
        })
    }

    /// Open a handle, checking the container name recorded elsewhere. A
    /// mismatch is suspicious but not fatal; flag edits would land next to
    /// this file either way.
    pub fn open_with_container<P: AsRef<Path>>(
        path: P,
        container: &str,
    ) -> Result<SaveFileHandle, TodIoError> {
        let handle = SaveFileHandle::open(path)?;
        if handle.layout.dataset != container {
            warn!(
                "container name {:?} does not match dataset {:?} from the filename",
                container, handle.layout.dataset
            );
        }
        Ok(handle)
    }

    pub fn flags_path(&self) -> &Path {
        &self.flags_path
    }
}

impl TimestreamData for SaveFileHandle {
    fn load(&self) -> Result<FlagDataset, TodIoError> {
        let save = SaveFile::load(&self.save_path)?;
        let mut flags = save.flags;
        if self.flags_path.exists() {
            let sibling = load_flags_file(&self.flags_path)?;
            sibling.check_shape(save.components.shape())?;
            flags = sibling;
        }
        Ok(FlagDataset {
            components: save.components,
            flags,
            map: save.map,
            ts_to_map: save.ts_to_map,
            header: save.header,
        })
    }

    fn save_flags(&self, flags: &FlagCube) -> Result<(), TodIoError> {
        save_flags_file(&self.flags_path, flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use tempfile::tempdir;

    const TS_NAME: &str = "050906_o11_raw_ds5.nc_indiv13pca_timestream00.tods";

    #[test]
    fn test_layout_parse() {
        let layout = DatasetLayout::parse(TS_NAME).unwrap();
        assert_eq!(layout.dataset, "050906_o11_raw_ds5.nc");
        assert_eq!(layout.file_prefix, "050906_o11_raw_ds5.nc_indiv13pca");
        assert_eq!(layout.map_number, "00");

        let from_map = DatasetLayout::parse("050906_o11_raw_ds5.nc_indiv13pca_map01.tods").unwrap();
        assert_eq!(from_map.map_number, "01");
        assert_eq!(from_map.file_prefix, layout.file_prefix);
    }

    #[test]
    fn test_layout_defaults_map_number() {
        let layout = DatasetLayout::parse("060118_ob4_raw_ds5.nc_indiv9pca_tstomap.sav").unwrap();
        assert_eq!(layout.map_number, "01");
    }

    #[test]
    fn test_sibling_names_round_trip() {
        let layout = DatasetLayout::parse(TS_NAME).unwrap();
        for name in [
            layout.timestream_name(),
            layout.map_name(),
            layout.tstomap_name(),
        ] {
            let reparsed = DatasetLayout::parse(&name).unwrap();
            assert_eq!(reparsed.file_prefix, layout.file_prefix);
        }
        assert_eq!(
            layout.flags_name(),
            "050906_o11_raw_ds5.nc_indiv13pca_flags.todf"
        );
    }

    #[test]
    fn test_unparseable_filename_aborts() {
        let err = DatasetLayout::parse("notes.txt").unwrap_err();
        assert!(matches!(err, TodIoError::FilenamePattern(_)));
    }

    fn small_savefile(shape: (usize, usize, usize)) -> SaveFile {
        let ones = Array3::<f64>::ones(shape);
        SaveFile {
            components: TimestreamComponents {
                raw: ones.clone(),
                astrosignal: Array3::zeros(shape),
                atmosphere: Array3::zeros(shape),
                ac_bolos: ones.mapv(|v| v * 2.0),
                dc_bolos: ones.clone(),
                scalearr: ones.clone(),
                weight: ones,
            },
            flags: FlagCube::zeros(shape),
            map: MapImage::new(Array2::zeros((4, 4))),
            ts_to_map: SampleToMapIndex::new(Array3::zeros(shape)),
            header: Vec::new(),
        }
    }

    #[test]
    fn test_flag_edits_persist_beside_container() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TS_NAME);
        small_savefile((1, 3, 3)).save(&path).unwrap();

        let handle = SaveFileHandle::open(&path).unwrap();
        let mut dataset = handle.load().unwrap();
        assert_eq!(dataset.flags.flagged_count(), 0);

        dataset.flags.data[[0, 1, 1]] = 2;
        handle.save_flags(&dataset.flags).unwrap();
        assert!(handle.flags_path().exists());

        // the sibling wins over the container's flags section
        let reloaded = handle.load().unwrap();
        assert_eq!(reloaded.flags.data[[0, 1, 1]], 2);
        assert_eq!(reloaded.flags.flagged_count(), 1);
    }

    #[test]
    fn test_container_mismatch_still_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TS_NAME);
        small_savefile((1, 2, 2)).save(&path).unwrap();

        let handle =
            SaveFileHandle::open_with_container(&path, "060118_ob4_raw_ds5.nc").unwrap();
        assert!(handle.load().is_ok());
    }

    #[test]
    fn test_into_session_selects_signal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TS_NAME);
        small_savefile((2, 3, 3)).save(&path).unwrap();

        let session = SaveFileHandle::open(&path)
            .unwrap()
            .load()
            .unwrap()
            .into_session(TimestreamSignal::SkySub)
            .unwrap();
        assert_eq!(session.nscans(), 2);
        // skysub = (ac_bolos - atmosphere) * scalearr = 2
        assert_eq!(session.samples[[0, 0, 0]], 2.0);
    }
}
