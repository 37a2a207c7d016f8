use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array2, Array3};

use todcore::data::cube::{FlagCube, MapImage, SampleToMapIndex, TimestreamComponents};

use crate::data::container::{zstd_compress, zstd_decompress, ZSTD_COMPRESSION_LEVEL};
use crate::data::header::HeaderCard;
use crate::error::TodIoError;

pub const SAVE_MAGIC: [u8; 4] = *b"TODS";
pub const SAVE_FORMAT_VERSION: u32 = 1;

const DTYPE_F64: u8 = 0;
const DTYPE_I32: u8 = 1;
const DTYPE_U64: u8 = 2;

/// Names of the component cube sections, in write order.
const COMPONENT_NAMES: [&str; 7] = [
    "raw",
    "astrosignal",
    "atmosphere",
    "ac_bolos",
    "dc_bolos",
    "scalearr",
    "weight",
];

/// A structured save container: the named component cubes, the flag cube,
/// the map image with its header record, and the sample-to-map index
/// table.
///
/// The binary layout is magic, version, a JSON header record, then named
/// zstd-compressed array sections. Legacy NetCDF/IDL formats are not
/// reproduced; this container carries the same fields.
#[derive(Debug)]
pub struct SaveFile {
    pub components: TimestreamComponents,
    pub flags: FlagCube,
    pub map: MapImage,
    pub ts_to_map: SampleToMapIndex,
    pub header: Vec<HeaderCard>,
}

impl SaveFile {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), TodIoError> {
        writer.write_all(&SAVE_MAGIC)?;
        writer.write_u32::<LittleEndian>(SAVE_FORMAT_VERSION)?;

        let header_json = serde_json::to_vec(&self.header)?;
        writer.write_u64::<LittleEndian>(header_json.len() as u64)?;
        writer.write_all(&header_json)?;

        // component cubes + flags + map + index table
        writer.write_u32::<LittleEndian>(COMPONENT_NAMES.len() as u32 + 3)?;

        let component_cubes = self.component_cubes();
        for (name, cube) in COMPONENT_NAMES.iter().zip(component_cubes) {
            let dims = dims3(cube.dim());
            write_section(writer, name, DTYPE_F64, &dims, f64_bytes(cube.iter()))?;
        }

        let clamped = self.flags.clamped();
        write_section(
            writer,
            "flags",
            DTYPE_I32,
            &dims3(clamped.dim()),
            i32_bytes(clamped.iter()),
        )?;

        let (map_h, map_w) = self.map.data.dim();
        write_section(
            writer,
            "map",
            DTYPE_F64,
            &[map_h as u64, map_w as u64],
            f64_bytes(self.map.data.iter()),
        )?;

        write_section(
            writer,
            "tstomap",
            DTYPE_U64,
            &dims3(self.ts_to_map.data.dim()),
            u64_bytes(self.ts_to_map.data.iter()),
        )?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<SaveFile, TodIoError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != SAVE_MAGIC {
            return Err(TodIoError::BadMagic(magic));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != SAVE_FORMAT_VERSION {
            return Err(TodIoError::UnsupportedVersion(version));
        }

        let header_len = reader.read_u64::<LittleEndian>()? as usize;
        let mut header_json = vec![0u8; header_len];
        reader.read_exact(&mut header_json)?;
        let header: Vec<HeaderCard> = serde_json::from_slice(&header_json)?;

        let nsections = reader.read_u32::<LittleEndian>()?;
        let mut sections = BTreeMap::new();
        for _ in 0..nsections {
            let (name, section) = read_section(reader)?;
            sections.insert(name, section);
        }

        let components = TimestreamComponents {
            raw: take_cube_f64(&mut sections, "raw")?,
            astrosignal: take_cube_f64(&mut sections, "astrosignal")?,
            atmosphere: take_cube_f64(&mut sections, "atmosphere")?,
            ac_bolos: take_cube_f64(&mut sections, "ac_bolos")?,
            dc_bolos: take_cube_f64(&mut sections, "dc_bolos")?,
            scalearr: take_cube_f64(&mut sections, "scalearr")?,
            weight: take_cube_f64(&mut sections, "weight")?,
        };
        let flags = FlagCube::new(take_cube_i32(&mut sections, "flags")?);
        let mut map = MapImage::new(take_map_f64(&mut sections, "map")?);
        let ts_to_map = SampleToMapIndex::new(take_cube_usize(&mut sections, "tstomap")?);

        // unobserved map pixels arrive as NaN
        map.zero_nans();

        // a shape violation aborts the load before any session exists
        let shape = components.shape();
        flags.check_shape(shape)?;
        ts_to_map.check_shape(shape)?;

        Ok(SaveFile {
            components,
            flags,
            map,
            ts_to_map,
            header,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TodIoError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<SaveFile, TodIoError> {
        let mut reader = BufReader::new(File::open(path)?);
        SaveFile::read_from(&mut reader)
    }

    fn component_cubes(&self) -> [&Array3<f64>; 7] {
        [
            &self.components.raw,
            &self.components.astrosignal,
            &self.components.atmosphere,
            &self.components.ac_bolos,
            &self.components.dc_bolos,
            &self.components.scalearr,
            &self.components.weight,
        ]
    }
}

struct Section {
    dtype: u8,
    dims: Vec<u64>,
    raw: Vec<u8>,
}

fn dims3(dim: (usize, usize, usize)) -> [u64; 3] {
    [dim.0 as u64, dim.1 as u64, dim.2 as u64]
}

fn f64_bytes<'a, I: Iterator<Item = &'a f64>>(values: I) -> Vec<u8> {
    let mut bytes = Vec::new();
    for &v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn i32_bytes<'a, I: Iterator<Item = &'a i32>>(values: I) -> Vec<u8> {
    let mut bytes = Vec::new();
    for &v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn u64_bytes<'a, I: Iterator<Item = &'a usize>>(values: I) -> Vec<u8> {
    let mut bytes = Vec::new();
    for &v in values {
        bytes.extend_from_slice(&(v as u64).to_le_bytes());
    }
    bytes
}

fn write_section<W: Write>(
    writer: &mut W,
    name: &str,
    dtype: u8,
    dims: &[u64],
    raw: Vec<u8>,
) -> Result<(), TodIoError> {
    writer.write_u16::<LittleEndian>(name.len() as u16)?;
    writer.write_all(name.as_bytes())?;
    writer.write_u8(dtype)?;
    writer.write_u8(dims.len() as u8)?;
    for &d in dims {
        writer.write_u64::<LittleEndian>(d)?;
    }
    let compressed = zstd_compress(&raw, ZSTD_COMPRESSION_LEVEL)?;
    writer.write_u64::<LittleEndian>(compressed.len() as u64)?;
    writer.write_all(&compressed)?;
    Ok(())
}

fn read_section<R: Read>(reader: &mut R) -> Result<(String, Section), TodIoError> {
    let name_len = reader.read_u16::<LittleEndian>()? as usize;
    let mut name = vec![0u8; name_len];
    reader.read_exact(&mut name)?;
    let name = String::from_utf8_lossy(&name).to_string();

    let dtype = reader.read_u8()?;
    let ndim = reader.read_u8()? as usize;
    let mut dims = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        dims.push(reader.read_u64::<LittleEndian>()?);
    }

    let compressed_len = reader.read_u64::<LittleEndian>()? as usize;
    let mut compressed = vec![0u8; compressed_len];
    reader.read_exact(&mut compressed)?;
    let raw = zstd_decompress(&compressed)?;

    Ok((name, Section { dtype, dims, raw }))
}

fn take_section(
    sections: &mut BTreeMap<String, Section>,
    name: &str,
    dtype: u8,
    ndim: usize,
) -> Result<Section, TodIoError> {
    let section = sections
        .remove(name)
        .ok_or_else(|| TodIoError::MissingSection(name.to_string()))?;
    if section.dtype != dtype {
        return Err(TodIoError::SectionTypeMismatch {
            name: name.to_string(),
            got: section.dtype,
        });
    }
    if section.dims.len() != ndim {
        return Err(TodIoError::SectionSizeMismatch {
            name: name.to_string(),
            got: section.dims.len(),
            expected: ndim,
        });
    }
    Ok(section)
}

fn check_len(name: &str, got: usize, dims: &[u64]) -> Result<(), TodIoError> {
    let expected: u64 = dims.iter().product();
    if got as u64 != expected {
        return Err(TodIoError::SectionSizeMismatch {
            name: name.to_string(),
            got,
            expected: expected as usize,
        });
    }
    Ok(())
}

fn take_cube_f64(
    sections: &mut BTreeMap<String, Section>,
    name: &str,
) -> Result<Array3<f64>, TodIoError> {
    let section = take_section(sections, name, DTYPE_F64, 3)?;
    let mut cursor = Cursor::new(section.raw);
    let count = cursor.get_ref().len() / 8;
    check_len(name, count, &section.dims)?;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(cursor.read_f64::<LittleEndian>()?);
    }
    shape3(name, &section.dims, values)
}

fn take_cube_i32(
    sections: &mut BTreeMap<String, Section>,
    name: &str,
) -> Result<Array3<i32>, TodIoError> {
    let section = take_section(sections, name, DTYPE_I32, 3)?;
    let mut cursor = Cursor::new(section.raw);
    let count = cursor.get_ref().len() / 4;
    check_len(name, count, &section.dims)?;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(cursor.read_i32::<LittleEndian>()?);
    }
    shape3(name, &section.dims, values)
}

fn take_cube_usize(
    sections: &mut BTreeMap<String, Section>,
    name: &str,
) -> Result<Array3<usize>, TodIoError> {
    let section = take_section(sections, name, DTYPE_U64, 3)?;
    let mut cursor = Cursor::new(section.raw);
    let count = cursor.get_ref().len() / 8;
    check_len(name, count, &section.dims)?;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(cursor.read_u64::<LittleEndian>()? as usize);
    }
    shape3(name, &section.dims, values)
}

fn take_map_f64(
    sections: &mut BTreeMap<String, Section>,
    name: &str,
) -> Result<Array2<f64>, TodIoError> {
    let section = take_section(sections, name, DTYPE_F64, 2)?;
    let mut cursor = Cursor::new(section.raw);
    let count = cursor.get_ref().len() / 8;
    check_len(name, count, &section.dims)?;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(cursor.read_f64::<LittleEndian>()?);
    }
    let shape = (section.dims[0] as usize, section.dims[1] as usize);
    Array2::from_shape_vec(shape, values).map_err(|_| TodIoError::SectionSizeMismatch {
        name: name.to_string(),
        got: count,
        expected: shape.0 * shape.1,
    })
}

fn shape3<T>(name: &str, dims: &[u64], values: Vec<T>) -> Result<Array3<T>, TodIoError> {
    let shape = (dims[0] as usize, dims[1] as usize, dims[2] as usize);
    let count = values.len();
    Array3::from_shape_vec(shape, values).map_err(|_| TodIoError::SectionSizeMismatch {
        name: name.to_string(),
        got: count,
        expected: shape.0 * shape.1 * shape.2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::header::CardValue;
    use tempfile::tempdir;

    fn small_savefile() -> SaveFile {
        let shape = (2, 3, 2);
        let ones = Array3::<f64>::ones(shape);
        let mut map = Array2::<f64>::zeros((4, 4));
        map[[1, 2]] = 9.0;
        map[[3, 3]] = f64::NAN;

        let mut ts_to_map = Array3::<usize>::zeros(shape);
        for ((i, j, k), idx) in ts_to_map.indexed_iter_mut() {
            *idx = (i + j * 4 + k) % 16;
        }

        let mut flags = FlagCube::zeros(shape);
        flags.data[[1, 2, 0]] = 2;

        SaveFile {
            components: TimestreamComponents {
                raw: ones.mapv(|v| v * 2.0),
                astrosignal: Array3::zeros(shape),
                atmosphere: ones.clone(),
                ac_bolos: ones.mapv(|v| v * 3.0),
                dc_bolos: ones.clone(),
                scalearr: ones.clone(),
                weight: ones,
            },
            flags,
            map: MapImage::new(map),
            ts_to_map: SampleToMapIndex::new(ts_to_map),
            header: vec![HeaderCard {
                name: "CRPIX1".to_string(),
                value: CardValue::Number(2.0),
                comment: String::new(),
            }],
        }
    }

    #[test]
    fn test_round_trip() {
        let original = small_savefile();
        let mut buf = Vec::new();
        original.write_to(&mut buf).unwrap();

        let loaded = SaveFile::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.components.raw, original.components.raw);
        assert_eq!(loaded.components.ac_bolos, original.components.ac_bolos);
        assert_eq!(loaded.flags, original.flags);
        assert_eq!(loaded.ts_to_map, original.ts_to_map);
        assert_eq!(loaded.header, original.header);

        // NaN map pixels are zeroed on load
        assert_eq!(loaded.map.data[[3, 3]], 0.0);
        assert_eq!(loaded.map.data[[1, 2]], 9.0);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dataset.tods");

        let original = small_savefile();
        original.save(&path).unwrap();
        let loaded = SaveFile::load(&path).unwrap();
        assert_eq!(loaded.flags, original.flags);
    }

    #[test]
    fn test_missing_section_aborts_load() {
        let original = small_savefile();
        let mut buf = Vec::new();
        original.write_to(&mut buf).unwrap();

        // drop the final section (tstomap) by truncating its payload
        buf.truncate(buf.len() - 8);
        assert!(SaveFile::read_from(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn test_rejects_flag_container_magic() {
        let mut buf = Vec::new();
        crate::data::container::write_flags(&mut buf, &FlagCube::zeros((1, 1, 1))).unwrap();
        let err = SaveFile::read_from(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, TodIoError::BadMagic(_)));
    }
}
