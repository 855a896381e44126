// NV21 to I420 pixel-format conversion
//
// NV21 stores the luma plane followed by interleaved VU chroma pairs. The
// hardware encoder wants either fully planar I420 (Y + U plane + V plane) or
// the semi-planar variant (Y + interleaved UV). Both conversions are pure
// byte permutations; no pixel values are interpreted.

use crate::frame::{yuv420_frame_size, PixelLayout};

/// Convert one NV21 frame into `dst` with the requested chroma layout.
///
/// `dst` must already be sized to at least the frame size for the given
/// resolution; this function never allocates. Returns `false` when the
/// resolution is empty or either buffer is too small.
pub fn nv21_to_yuv420(
    src: &[u8],
    width: u32,
    height: u32,
    dst: &mut [u8],
    layout: PixelLayout,
) -> bool {
    let luma = width as usize * height as usize;
    if luma == 0 {
        return false;
    }
    let frame_size = yuv420_frame_size(width, height);
    if src.len() < frame_size || dst.len() < frame_size {
        return false;
    }

    dst[..luma].copy_from_slice(&src[..luma]);

    // NV21 chroma: V then U per pair.
    let chroma = luma / 4;
    for k in 0..chroma {
        let v = src[luma + 2 * k];
        let u = src[luma + 2 * k + 1];
        match layout {
            PixelLayout::Planar => {
                dst[luma + k] = u;
                dst[luma + chroma + k] = v;
            }
            PixelLayout::SemiPlanar => {
                dst[luma + 2 * k] = u;
                dst[luma + 2 * k + 1] = v;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nv21_frame(width: u32, height: u32) -> Vec<u8> {
        let size = yuv420_frame_size(width, height);
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn rejects_empty_resolution() {
        let src = [0u8; 64];
        let mut dst = [0u8; 64];
        assert!(!nv21_to_yuv420(&src, 0, 4, &mut dst, PixelLayout::Planar));
        assert!(!nv21_to_yuv420(&src, 4, 0, &mut dst, PixelLayout::Planar));
    }

    #[test]
    fn rejects_undersized_buffers() {
        let src = nv21_frame(4, 4);
        let mut small = vec![0u8; yuv420_frame_size(4, 4) - 1];
        assert!(!nv21_to_yuv420(&src, 4, 4, &mut small, PixelLayout::Planar));

        let mut dst = vec![0u8; yuv420_frame_size(4, 4)];
        assert!(!nv21_to_yuv420(
            &src[..src.len() - 1],
            4,
            4,
            &mut dst,
            PixelLayout::Planar
        ));
    }

    #[test]
    fn luma_is_copied_verbatim() {
        let (w, h) = (6, 4);
        let src = nv21_frame(w, h);
        let luma = (w * h) as usize;
        for layout in [PixelLayout::Planar, PixelLayout::SemiPlanar] {
            let mut dst = vec![0u8; yuv420_frame_size(w, h)];
            assert!(nv21_to_yuv420(&src, w, h, &mut dst, layout));
            assert_eq!(&dst[..luma], &src[..luma]);
        }
    }

    #[test]
    fn planar_separates_chroma_planes() {
        let (w, h) = (4, 4);
        let luma = (w * h) as usize;
        let chroma = luma / 4;
        let src = nv21_frame(w, h);
        let mut dst = vec![0u8; yuv420_frame_size(w, h)];
        assert!(nv21_to_yuv420(&src, w, h, &mut dst, PixelLayout::Planar));
        for k in 0..chroma {
            assert_eq!(dst[luma + k], src[luma + 2 * k + 1], "U sample {}", k);
            assert_eq!(dst[luma + chroma + k], src[luma + 2 * k], "V sample {}", k);
        }
    }

    #[test]
    fn semi_planar_swaps_pairs_in_place() {
        let (w, h) = (4, 4);
        let luma = (w * h) as usize;
        let src = nv21_frame(w, h);
        let mut dst = vec![0u8; yuv420_frame_size(w, h)];
        assert!(nv21_to_yuv420(&src, w, h, &mut dst, PixelLayout::SemiPlanar));
        for k in 0..luma / 4 {
            assert_eq!(dst[luma + 2 * k], src[luma + 2 * k + 1]);
            assert_eq!(dst[luma + 2 * k + 1], src[luma + 2 * k]);
        }
    }

    #[test]
    fn planar_permutation_inverts_exactly() {
        let (w, h) = (8, 6);
        let luma = (w * h) as usize;
        let chroma = luma / 4;
        let src = nv21_frame(w, h);
        let mut dst = vec![0u8; yuv420_frame_size(w, h)];
        assert!(nv21_to_yuv420(&src, w, h, &mut dst, PixelLayout::Planar));

        // Invert the known permutation and recover the original chroma pairs.
        let mut recovered = dst.clone();
        for k in 0..chroma {
            recovered[luma + 2 * k] = dst[luma + chroma + k];
            recovered[luma + 2 * k + 1] = dst[luma + k];
        }
        assert_eq!(&recovered[luma..], &src[luma..]);
    }
}
