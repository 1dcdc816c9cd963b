//! Mount-point reparse data buffer construction and parsing.
//!
//! Layout mirrors `REPARSE_DATA_BUFFER` for `IO_REPARSE_TAG_MOUNT_POINT`:
//! a tag/length header followed by a `MountPointReparseBuffer` (two
//! offset/length pairs) and then the UTF-16LE substitute and print names
//! back to back in a single path buffer.

pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct ReparseDataHeader {
    reparse_tag: u32,
    reparse_data_length: u16,
    reserved: u16,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct MountPointReparseBuffer {
    substitute_name_offset: u16,
    substitute_name_length: u16,
    print_name_offset: u16,
    print_name_length: u16,
}

const HEADER_SIZE: usize = std::mem::size_of::<ReparseDataHeader>();
const MOUNT_POINT_BUFFER_SIZE: usize = std::mem::size_of::<MountPointReparseBuffer>();

/// Build the byte buffer to hand to `FSCTL_SET_REPARSE_POINT` for a mount
/// point whose substitute name is `target` and whose print name is empty.
pub fn build_mount_point_buffer(target: &str) -> Vec<u8> {
    let substitute_name: Vec<u16> = target.encode_utf16().collect();
    let substitute_bytes = substitute_name.len() * 2;
    // Print name is empty; its offset sits right after the substitute name.
    let print_name_offset = substitute_bytes as u16 + 2;

    let mount_point = MountPointReparseBuffer {
        substitute_name_offset: 0,
        substitute_name_length: substitute_bytes as u16,
        print_name_offset,
        print_name_length: 0,
    };

    let path_buffer_len = substitute_bytes + 2 /* substitute NUL */ + 2 /* print NUL */;
    let data_length = MOUNT_POINT_BUFFER_SIZE + path_buffer_len;

    let header = ReparseDataHeader {
        reparse_tag: IO_REPARSE_TAG_MOUNT_POINT,
        reparse_data_length: data_length as u16,
        reserved: 0,
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + data_length);
    buf.extend_from_slice(&header.reparse_tag.to_le_bytes());
    buf.extend_from_slice(&header.reparse_data_length.to_le_bytes());
    buf.extend_from_slice(&header.reserved.to_le_bytes());
    buf.extend_from_slice(&mount_point.substitute_name_offset.to_le_bytes());
    buf.extend_from_slice(&mount_point.substitute_name_length.to_le_bytes());
    buf.extend_from_slice(&mount_point.print_name_offset.to_le_bytes());
    buf.extend_from_slice(&mount_point.print_name_length.to_le_bytes());
    for unit in &substitute_name {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf
}

/// Extract the substitute name from a buffer previously read back via
/// `FSCTL_GET_REPARSE_POINT`. Returns `None` if it is not a mount point.
pub fn parse_mount_point_substitute_name(data: &[u8]) -> Option<String> {
    if data.len() < HEADER_SIZE + MOUNT_POINT_BUFFER_SIZE {
        return None;
    }
    let tag = u32::from_le_bytes(data[0..4].try_into().unwrap());
    if tag != IO_REPARSE_TAG_MOUNT_POINT {
        return None;
    }
    let body = &data[HEADER_SIZE..];
    let sub_offset = u16::from_le_bytes(body[0..2].try_into().unwrap()) as usize;
    let sub_length = u16::from_le_bytes(body[2..4].try_into().unwrap()) as usize;
    let path_buffer = &body[MOUNT_POINT_BUFFER_SIZE..];
    let start = sub_offset;
    let end = start.checked_add(sub_length)?;
    if end > path_buffer.len() {
        return None;
    }
    let units: Vec<u16> = path_buffer[start..end]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_substitute_name() {
        let target = r"\Device\SafeRamDisk\";
        let buf = build_mount_point_buffer(target);
        assert_eq!(parse_mount_point_substitute_name(&buf).as_deref(), Some(target));
    }

    #[test]
    fn rejects_truncated_buffer() {
        assert_eq!(parse_mount_point_substitute_name(&[0u8; 2]), None);
    }
}
