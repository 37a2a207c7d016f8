use std::fs::File;
use std::io;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array3;

use todcore::data::cube::FlagCube;

use crate::error::TodIoError;

pub const FLAG_MAGIC: [u8; 4] = *b"TODF";
pub const FLAG_FORMAT_VERSION: u32 = 1;
pub const ZSTD_COMPRESSION_LEVEL: i32 = 3;

/// Compresses a byte array using ZSTD
pub fn zstd_compress(decompressed_data: &[u8], compression_level: i32) -> io::Result<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), compression_level)?;
    encoder.write_all(decompressed_data)?;
    let compressed_data = encoder.finish()?;
    Ok(compressed_data)
}

/// Decompresses a ZSTD compressed byte array
pub fn zstd_decompress(compressed_data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(compressed_data)?;
    let mut decompressed_data = Vec::new();
    decoder.read_to_end(&mut decompressed_data)?;
    Ok(decompressed_data)
}

/// Write the flags-only container.
///
/// Layout, all little-endian: magic `TODF`, format version, the three cube
/// dimensions, the compressed payload length, then the zstd-compressed
/// `i32` cube in row-major order. Unflag markers are clamped to zero on
/// write; the in-memory cube is left untouched, so a failed save loses
/// nothing.
pub fn write_flags<W: Write>(writer: &mut W, flags: &FlagCube) -> Result<(), TodIoError> {
    let clamped = flags.clamped();
    let (nscans, scanlen, nbolos) = clamped.dim();

    let mut raw = Vec::with_capacity(clamped.len() * 4);
    for &cell in clamped.iter() {
        raw.write_i32::<LittleEndian>(cell)?;
    }
    let compressed = zstd_compress(&raw, ZSTD_COMPRESSION_LEVEL)?;

    writer.write_all(&FLAG_MAGIC)?;
    writer.write_u32::<LittleEndian>(FLAG_FORMAT_VERSION)?;
    writer.write_u32::<LittleEndian>(nscans as u32)?;
    writer.write_u32::<LittleEndian>(scanlen as u32)?;
    writer.write_u32::<LittleEndian>(nbolos as u32)?;
    writer.write_u64::<LittleEndian>(compressed.len() as u64)?;
    writer.write_all(&compressed)?;
    Ok(())
}

/// Read a flags-only container back into a cube.
pub fn read_flags<R: Read>(reader: &mut R) -> Result<FlagCube, TodIoError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != FLAG_MAGIC {
        return Err(TodIoError::BadMagic(magic));
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != FLAG_FORMAT_VERSION {
        return Err(TodIoError::UnsupportedVersion(version));
    }

    let nscans = reader.read_u32::<LittleEndian>()? as usize;
    let scanlen = reader.read_u32::<LittleEndian>()? as usize;
    let nbolos = reader.read_u32::<LittleEndian>()? as usize;
    let compressed_len = reader.read_u64::<LittleEndian>()? as usize;

    let mut compressed = vec![0u8; compressed_len];
    reader.read_exact(&mut compressed)?;
    let raw = zstd_decompress(&compressed)?;

    let expected = nscans * scanlen * nbolos;
    if raw.len() != expected * 4 {
        return Err(TodIoError::SectionSizeMismatch {
            name: "flags".to_string(),
            got: raw.len() / 4,
            expected,
        });
    }

    let mut cells = Vec::with_capacity(expected);
    let mut cursor = io::Cursor::new(raw);
    for _ in 0..expected {
        cells.push(cursor.read_i32::<LittleEndian>()?);
    }

    let data = Array3::from_shape_vec((nscans, scanlen, nbolos), cells)
        .map_err(|_| TodIoError::SectionSizeMismatch {
            name: "flags".to_string(),
            got: expected,
            expected,
        })?;
    Ok(FlagCube::new(data))
}

/// Save a flag cube to a file path.
pub fn save_flags_file<P: AsRef<Path>>(path: P, flags: &FlagCube) -> Result<(), TodIoError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_flags(&mut writer, flags)?;
    writer.flush()?;
    Ok(())
}

/// Load a flag cube from a file path.
pub fn load_flags_file<P: AsRef<Path>>(path: P) -> Result<FlagCube, TodIoError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_flags(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip() {
        let mut flags = FlagCube::zeros((2, 3, 4));
        flags.data[[0, 1, 2]] = 3;
        flags.data[[1, 0, 0]] = 1;

        let mut buf = Vec::new();
        write_flags(&mut buf, &flags).unwrap();
        let loaded = read_flags(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded, flags);
    }

    #[test]
    fn test_write_clamps_unflag_markers() {
        let mut flags = FlagCube::zeros((1, 2, 2));
        flags.data[[0, 0, 0]] = 2;
        flags.data[[0, 1, 1]] = -3;

        let mut buf = Vec::new();
        write_flags(&mut buf, &flags).unwrap();
        let loaded = read_flags(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.data[[0, 0, 0]], 2);
        assert_eq!(loaded.data[[0, 1, 1]], 0);
        // the in-memory cube still has its marker
        assert_eq!(flags.data[[0, 1, 1]], -3);
    }

    #[test]
    fn test_rejects_foreign_files() {
        let garbage = b"FITS0000000000000000";
        let err = read_flags(&mut garbage.as_slice()).unwrap_err();
        assert!(matches!(err, TodIoError::BadMagic(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan_flags.todf");

        let mut flags = FlagCube::zeros((1, 4, 4));
        flags.data[[0, 2, 2]] = 5;
        save_flags_file(&path, &flags).unwrap();

        let loaded = load_flags_file(&path).unwrap();
        assert_eq!(loaded, flags);
    }
}
