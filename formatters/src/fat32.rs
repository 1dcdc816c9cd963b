//! FAT32 RAM disk image formatter.
//!
//! Lays down a minimal, single-FAT FAT32 image directly into a caller-owned
//! byte buffer: boot sector at sector 0, FS information sector at sector 1,
//! first FAT sector at sector 2. Byte offsets follow the BIOS Parameter
//! Block layout in `constants`, the same layout `formatter_native.rs` in the
//! teacher writes out disk-backed, just without the second FAT copy or
//! backup boot sector the teacher's dual-FAT format carries — the ramdisk
//! image has no redundancy requirement.

use crate::constants::*;
use log::info;
use saferamdisk_core::error::{DriverError, Result};
use saferamdisk_core::geometry::{
    minimum_image_size, BYTES_PER_SECTOR, DiskGeometry, RESERVED_SECTORS, SECTORS_PER_CLUSTER,
};

const OEM_NAME: &[u8; 8] = b"SAFERAMD";
const VOLUME_LABEL: &[u8; 11] = b"SAFERAMDISK";
const FS_TYPE: &[u8; 8] = b"FAT32   ";
const VOLUME_ID: u32 = 0x0205_1986;
const MEDIA_DESCRIPTOR: u8 = 0xF8;
const JUMP_BOOT: [u8; 3] = [0xEB, 0x76, 0x90];
const ROOT_CLUSTER: u32 = 2;
const SECTORS_PER_TRACK: u16 = 32;
const NUM_HEADS: u16 = 2;
const EXT_BOOT_SIGNATURE: u8 = 0x29;

/// Formats `buf` as a FAT32 image. `buf.len()` is the image size in bytes
/// and must be a multiple of `BYTES_PER_SECTOR`, at least large enough for
/// the reserved sectors, one FAT sector and one data cluster.
///
/// Returns the geometry computed for the image so the caller can size reads
/// and writes against it without recomputing the same arithmetic.
pub fn format_image(buf: &mut [u8]) -> Result<DiskGeometry> {
    if buf.len() % BYTES_PER_SECTOR as usize != 0 {
        return Err(DriverError::InvalidParameter(format!(
            "image size {} is not a multiple of the sector size {}",
            buf.len(),
            BYTES_PER_SECTOR
        )));
    }
    if (buf.len() as u64) < minimum_image_size() {
        return Err(DriverError::InvalidParameter(format!(
            "image size {} is below the minimum {} required for reserved sectors + one FAT sector + one data cluster",
            buf.len(),
            minimum_image_size()
        )));
    }
    let geometry = DiskGeometry::from_image_size(buf.len() as u64);

    buf.fill(0);
    write_boot_sector(buf, &geometry);
    write_fsinfo_sector(buf);
    write_first_fat_sector(buf);

    info!(
        "formatted {}-byte FAT32 image: {} total sectors, {} sectors/FAT",
        buf.len(),
        geometry.total_sectors,
        geometry.sectors_per_fat
    );
    Ok(geometry)
}

fn write_boot_sector(buf: &mut [u8], geometry: &DiskGeometry) {
    buf[BS_JMP_BOOT..BS_JMP_BOOT + 3].copy_from_slice(&JUMP_BOOT);
    buf[BS_OEM_NAME..BS_OEM_NAME + 8].copy_from_slice(OEM_NAME);

    buf[BPB_BYTES_PER_SEC..BPB_BYTES_PER_SEC + 2].copy_from_slice(&BYTES_PER_SECTOR.to_le_bytes());
    buf[BPB_SEC_PER_CLUS] = SECTORS_PER_CLUSTER;
    buf[BPB_RSVD_SEC_CNT..BPB_RSVD_SEC_CNT + 2]
        .copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
    buf[BPB_NUM_FATS] = 1;
    buf[BPB_ROOT_ENT_CNT..BPB_ROOT_ENT_CNT + 2].copy_from_slice(&0u16.to_le_bytes());
    buf[BPB_TOT_SEC16..BPB_TOT_SEC16 + 2].copy_from_slice(&0u16.to_le_bytes());
    buf[BPB_MEDIA] = MEDIA_DESCRIPTOR;
    buf[BPB_FAT_SZ16..BPB_FAT_SZ16 + 2].copy_from_slice(&0u16.to_le_bytes());
    buf[BPB_SEC_PER_TRK..BPB_SEC_PER_TRK + 2].copy_from_slice(&SECTORS_PER_TRACK.to_le_bytes());
    buf[BPB_NUM_HEADS..BPB_NUM_HEADS + 2].copy_from_slice(&NUM_HEADS.to_le_bytes());
    buf[BPB_HIDD_SEC..BPB_HIDD_SEC + 4].copy_from_slice(&0u32.to_le_bytes());
    buf[BPB_TOT_SEC32..BPB_TOT_SEC32 + 4]
        .copy_from_slice(&(geometry.total_sectors as u32).to_le_bytes());

    buf[BPB_FAT_SZ32..BPB_FAT_SZ32 + 4]
        .copy_from_slice(&(geometry.sectors_per_fat as u32).to_le_bytes());
    buf[BPB_EXT_FLAGS..BPB_EXT_FLAGS + 2].copy_from_slice(&0u16.to_le_bytes());
    buf[BPB_FS_VER..BPB_FS_VER + 2].copy_from_slice(&0u16.to_le_bytes());
    buf[BPB_ROOT_CLUS..BPB_ROOT_CLUS + 4].copy_from_slice(&ROOT_CLUSTER.to_le_bytes());
    buf[BPB_FS_INFO..BPB_FS_INFO + 2].copy_from_slice(&1u16.to_le_bytes());
    buf[BPB_BK_BOOT_SEC..BPB_BK_BOOT_SEC + 2].copy_from_slice(&0u16.to_le_bytes());

    buf[BS32_DRV_NUM] = 0x80;
    buf[BS32_BOOT_SIG] = EXT_BOOT_SIGNATURE;
    buf[BS32_VOL_ID..BS32_VOL_ID + 4].copy_from_slice(&VOLUME_ID.to_le_bytes());
    buf[BS32_VOL_LAB..BS32_VOL_LAB + 11].copy_from_slice(VOLUME_LABEL);
    buf[BS32_FIL_SYS_TYPE..BS32_FIL_SYS_TYPE + 8].copy_from_slice(FS_TYPE);

    buf[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2].copy_from_slice(&BOOT_SIGNATURE);
}

fn write_fsinfo_sector(buf: &mut [u8]) {
    let base = BYTES_PER_SECTOR as usize;
    buf[base..base + 4].copy_from_slice(&FSINFO_LEAD_SIG.to_le_bytes());
    buf[base + FSINFO_STRUCT_SIG_OFFSET..base + FSINFO_STRUCT_SIG_OFFSET + 4]
        .copy_from_slice(&FSINFO_STRUCT_SIG.to_le_bytes());
    buf[base + FSINFO_FREE_COUNT_OFFSET..base + FSINFO_FREE_COUNT_OFFSET + 4]
        .copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    buf[base + FSINFO_NEXT_FREE_OFFSET..base + FSINFO_NEXT_FREE_OFFSET + 4]
        .copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    buf[base + FSINFO_TRAIL_SIG_OFFSET..base + FSINFO_TRAIL_SIG_OFFSET + 4]
        .copy_from_slice(&FSINFO_TRAIL_SIG);
}

fn write_first_fat_sector(buf: &mut [u8]) {
    let base = RESERVED_SECTORS as usize * BYTES_PER_SECTOR as usize;
    let entry0 = 0xFFFF_FF00u32 | MEDIA_DESCRIPTOR as u32;
    buf[base..base + 4].copy_from_slice(&entry0.to_le_bytes());
    buf[base + 4..base + 8].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    buf[base + 8..base + 12].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use saferamdisk_core::geometry::minimum_image_size;

    fn formatted(size: u64) -> Vec<u8> {
        let mut buf = vec![0u8; size as usize];
        format_image(&mut buf).unwrap();
        buf
    }

    #[test]
    fn boot_sector_has_expected_shape() {
        let buf = formatted(minimum_image_size());
        assert_eq!(&buf[0..3], &JUMP_BOOT);
        assert_eq!(&buf[BS_OEM_NAME..BS_OEM_NAME + 8], OEM_NAME);
        assert_eq!(
            u16::from_le_bytes(buf[11..13].try_into().unwrap()),
            BYTES_PER_SECTOR
        );
        assert_eq!(buf[13], SECTORS_PER_CLUSTER);
        assert_eq!(u16::from_le_bytes(buf[14..16].try_into().unwrap()), RESERVED_SECTORS as u16);
        assert_eq!(buf[16], 1);
        assert_eq!(buf[21], MEDIA_DESCRIPTOR);
        let total_sectors = u32::from_le_bytes(buf[32..36].try_into().unwrap());
        assert_eq!(total_sectors as u64, minimum_image_size() / BYTES_PER_SECTOR as u64);
        assert_eq!(u32::from_le_bytes(buf[44..48].try_into().unwrap()), ROOT_CLUSTER);
        assert_eq!(&buf[BS32_VOL_LAB..BS32_VOL_LAB + 11], VOLUME_LABEL);
        assert_eq!(
            u32::from_le_bytes(buf[BS32_VOL_ID..BS32_VOL_ID + 4].try_into().unwrap()),
            VOLUME_ID
        );
        assert_eq!(&buf[510..512], &BOOT_SIGNATURE);
    }

    #[test]
    fn fsinfo_sector_has_expected_signatures() {
        let buf = formatted(minimum_image_size());
        let base = 512;
        assert_eq!(
            u32::from_le_bytes(buf[base..base + 4].try_into().unwrap()),
            FSINFO_LEAD_SIG
        );
        assert_eq!(
            u32::from_le_bytes(buf[base + 484..base + 488].try_into().unwrap()),
            FSINFO_STRUCT_SIG
        );
        assert_eq!(
            u32::from_le_bytes(buf[base + 488..base + 492].try_into().unwrap()),
            0xFFFF_FFFF
        );
        assert_eq!(
            u32::from_le_bytes(buf[base + 492..base + 496].try_into().unwrap()),
            0xFFFF_FFFF
        );
        assert_eq!(&buf[base + 508..base + 512], &FSINFO_TRAIL_SIG);
    }

    #[test]
    fn first_fat_sector_reserves_media_and_eoc_entries() {
        let buf = formatted(minimum_image_size());
        let base = 1024;
        let entry0 = u32::from_le_bytes(buf[base..base + 4].try_into().unwrap());
        assert_eq!(entry0, 0xFFFF_FFF8);
        assert_eq!(
            u32::from_le_bytes(buf[base + 4..base + 8].try_into().unwrap()),
            0xFFFF_FFFF
        );
        assert_eq!(
            u32::from_le_bytes(buf[base + 8..base + 12].try_into().unwrap()),
            0xFFFF_FFFF
        );
    }

    #[test]
    fn rejects_size_not_a_multiple_of_sector_size() {
        let mut buf = vec![0u8; minimum_image_size() as usize + 1];
        assert!(format_image(&mut buf).is_err());
    }
}
