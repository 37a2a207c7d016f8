use ndarray::s;

use crate::data::cube::FlagCube;
use crate::error::CoreError;

/// Add one flag layer to every cell of a scan.
///
/// Bulk operations keep no region bookkeeping; their only record is the
/// flag cube itself.
pub fn flag_scan(flags: &mut FlagCube, scan: usize) -> Result<(), CoreError> {
    check_scan(flags, scan)?;
    flags
        .data
        .slice_mut(s![scan, .., ..])
        .mapv_inplace(|c| c + 1);
    Ok(())
}

/// Remove one flag layer from every positively flagged cell of a scan,
/// clamped at zero. Idempotent once the scan slice is clear.
pub fn unflag_scan(flags: &mut FlagCube, scan: usize) -> Result<(), CoreError> {
    check_scan(flags, scan)?;
    flags
        .data
        .slice_mut(s![scan, .., ..])
        .mapv_inplace(|c| if c > 0 { c - 1 } else { c });
    Ok(())
}

fn check_scan(flags: &FlagCube, scan: usize) -> Result<(), CoreError> {
    if scan >= flags.nscans() {
        return Err(CoreError::ScanOutOfRange {
            scan,
            nscans: flags.nscans(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_whole_scan_touches_only_that_scan() {
        // spec scenario: (2, 3, 3) cube, flag scan 0
        let mut flags = FlagCube::zeros((2, 3, 3));
        flag_scan(&mut flags, 0).unwrap();

        assert!(flags.data.slice(s![0, .., ..]).iter().all(|&c| c == 1));
        assert!(flags.data.slice(s![1, .., ..]).iter().all(|&c| c == 0));

        unflag_scan(&mut flags, 0).unwrap();
        assert!(flags.data.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_unflag_scan_idempotent_at_zero() {
        let mut flags = FlagCube::zeros((1, 2, 2));
        flags.data[[0, 0, 0]] = 2;

        unflag_scan(&mut flags, 0).unwrap();
        unflag_scan(&mut flags, 0).unwrap();
        assert!(flags.data.iter().all(|&c| c == 0));

        let before = flags.clone();
        unflag_scan(&mut flags, 0).unwrap();
        assert_eq!(flags, before);
    }

    #[test]
    fn test_scan_bounds_checked() {
        let mut flags = FlagCube::zeros((2, 2, 2));
        assert!(flag_scan(&mut flags, 2).is_err());
        assert!(unflag_scan(&mut flags, 5).is_err());
    }
}
