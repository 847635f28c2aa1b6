use crate::error::Result;
use crate::utils::BitReader;

const NAL_TYPE_SPS: u8 = 7;

/// Searches an elementary-stream byte window for an SPS NAL unit and
/// returns the coded picture dimensions.
///
/// The window may still carry PES framing; the start-code scan skips
/// anything that is not an SPS. Returns `None` when no parseable SPS is
/// present — resolution is a best-effort hint, never a hard requirement.
pub fn find_sps_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut i = 0;
    while i + 4 < data.len() {
        // Annex-B start code: 00 00 01 (optionally preceded by another 00)
        if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
            let nal_start = i + 3;
            if nal_start < data.len() && (data[nal_start] & 0x1F) == NAL_TYPE_SPS {
                let nal_end = next_start_code(data, nal_start).unwrap_or(data.len());
                let rbsp = strip_emulation_prevention(&data[nal_start + 1..nal_end]);
                if let Ok(dims) = parse_sps_dimensions(&rbsp) {
                    return Some(dims);
                }
            }
            i = nal_start;
        } else {
            i += 1;
        }
    }
    None
}

fn next_start_code(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 && (data[i + 2] == 0x01 || data[i + 2] == 0x00) {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Removes 00 00 03 emulation-prevention bytes from NAL payload data.
fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if i + 2 < data.len() && data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x03 {
            out.push(0x00);
            out.push(0x00);
            i += 3;
            continue;
        }
        out.push(data[i]);
        i += 1;
    }
    out
}

/// Parses the leading fields of an SPS RBSP (NAL header byte already
/// removed) up to the picture size, per ISO/IEC 14496-10 §7.3.2.1.
fn parse_sps_dimensions(data: &[u8]) -> Result<(u32, u32)> {
    let mut reader = BitReader::new(data);

    let profile_idc = reader.read_bits(8)? as u8;
    reader.skip_bits(16)?; // constraint flags, reserved bits, level_idc
    reader.read_golomb()?; // seq_parameter_set_id

    // Chroma format related fields only present for high profiles
    if matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138
    ) {
        let chroma_format_idc = reader.read_golomb()?;
        if chroma_format_idc == 3 {
            reader.read_bits(1)?; // separate_colour_plane_flag
        }
        reader.read_golomb()?; // bit_depth_luma_minus8
        reader.read_golomb()?; // bit_depth_chroma_minus8
        reader.read_bits(1)?; // qpprime_y_zero_transform_bypass_flag

        let scaling_matrix_present = reader.read_bits(1)?;
        if scaling_matrix_present == 1 {
            let count = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..count {
                let scaling_list_present = reader.read_bits(1)?;
                if scaling_list_present == 1 {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    reader.read_golomb()?; // log2_max_frame_num_minus4
    let pic_order_cnt_type = reader.read_golomb()?;

    if pic_order_cnt_type == 0 {
        reader.read_golomb()?; // log2_max_pic_order_cnt_lsb_minus4
    } else if pic_order_cnt_type == 1 {
        reader.read_bits(1)?; // delta_pic_order_always_zero_flag
        reader.read_signed_golomb()?; // offset_for_non_ref_pic
        reader.read_signed_golomb()?; // offset_for_top_to_bottom_field
        let num_ref_frames_in_pic_order_cnt_cycle = reader.read_golomb()?;
        for _ in 0..num_ref_frames_in_pic_order_cnt_cycle {
            reader.read_signed_golomb()?;
        }
    }

    reader.read_golomb()?; // max_num_ref_frames
    reader.read_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs = reader.read_golomb()? + 1;
    let pic_height_in_map_units = reader.read_golomb()? + 1;
    let frame_mbs_only_flag = reader.read_bits(1)?;

    let width = pic_width_in_mbs * 16;
    let height = (2 - frame_mbs_only_flag) * pic_height_in_map_units * 16;

    Ok((width, height))
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) -> Result<()> {
    let mut last_scale = 8;
    let mut next_scale = 8;

    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = reader.read_signed_golomb()?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }

    Ok(())
}
