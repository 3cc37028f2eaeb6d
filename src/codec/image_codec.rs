use std::{fs::File, io::BufReader, path::Path};

use image::{
    AnimationDecoder, Delay, DynamicImage, ImageDecoder, ImageFormat, ImageReader,
    codecs::gif::{GifDecoder, GifEncoder, Repeat},
};

use super::{DecodedSource, FrameCodec, write_atomically};
use crate::foundation::{
    core::{Canvas, Centis, Frame},
    error::{MonoframeError, MonoframeResult},
};

/// Still images in any format the `image` crate reads, plus animated GIF in both directions.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageCodec;

impl ImageCodec {
    fn decode_gif(&self, source: &Path) -> MonoframeResult<DecodedSource> {
        let file = File::open(source).map_err(|e| {
            MonoframeError::decode(format!("failed to open '{}': {e}", source.display()))
        })?;
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| {
            MonoframeError::decode(format!("failed to read gif '{}': {e}", source.display()))
        })?;
        let (width, height) = decoder.dimensions();
        let frames = decoder.into_frames().collect_frames().map_err(|e| {
            MonoframeError::decode(format!("failed to decode gif '{}': {e}", source.display()))
        })?;

        let mut out = Vec::with_capacity(frames.len());
        let mut durations = Vec::with_capacity(frames.len());
        for frame in frames {
            durations.push(delay_to_centis(frame.delay()));
            let rgb = DynamicImage::ImageRgba8(frame.into_buffer()).into_rgb8();
            out.push(Frame::from_rgb_image(rgb));
        }
        tracing::debug!(
            source = %source.display(),
            frames = out.len(),
            width,
            height,
            "decoded gif"
        );

        Ok(DecodedSource {
            frames: out,
            durations,
            canvas: Canvas::new(width, height),
        })
    }

    fn decode_still(&self, source: &Path) -> MonoframeResult<DecodedSource> {
        let img = ImageReader::open(source)
            .map_err(|e| MonoframeError::decode(format!("failed to open '{}': {e}", source.display())))?
            .with_guessed_format()
            .map_err(|e| MonoframeError::decode(format!("failed to read '{}': {e}", source.display())))?
            .decode()
            .map_err(|e| {
                MonoframeError::decode(format!("failed to decode '{}': {e}", source.display()))
            })?;
        let frame = Frame::from_dynamic(img);
        let canvas = Canvas::new(frame.width(), frame.height());
        Ok(DecodedSource {
            frames: vec![frame],
            durations: vec![Centis::DEFAULT_FRAME],
            canvas,
        })
    }
}

impl FrameCodec for ImageCodec {
    fn decode(&self, source: &Path) -> MonoframeResult<DecodedSource> {
        let format = ImageReader::open(source)
            .map_err(|e| MonoframeError::decode(format!("failed to open '{}': {e}", source.display())))?
            .with_guessed_format()
            .map_err(|e| MonoframeError::decode(format!("failed to read '{}': {e}", source.display())))?
            .format();
        match format {
            Some(ImageFormat::Gif) => self.decode_gif(source),
            Some(_) => self.decode_still(source),
            None => Err(MonoframeError::decode(format!(
                "unrecognized image format: '{}'",
                source.display()
            ))),
        }
    }

    fn encode_animated(
        &self,
        frames: &[Frame],
        durations: &[Centis],
        loop_count: u16,
        canvas: Canvas,
        out: &Path,
    ) -> MonoframeResult<()> {
        if frames.is_empty() {
            return Err(MonoframeError::invalid_argument("no frames to encode"));
        }
        if frames.len() != durations.len() {
            return Err(MonoframeError::invalid_argument(format!(
                "{} frames but {} durations",
                frames.len(),
                durations.len()
            )));
        }
        if let Some((idx, f)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.dimensions() != (canvas.width, canvas.height))
        {
            return Err(MonoframeError::invalid_argument(format!(
                "frame {idx} is {}x{}, canvas is {}x{}",
                f.width(), f.height(), canvas.width, canvas.height
            )));
        }

        write_atomically(out, |w| {
            let mut encoder = GifEncoder::new(w);
            let repeat = if loop_count == 0 {
                Repeat::Infinite
            } else {
                Repeat::Finite(loop_count)
            };
            encoder
                .set_repeat(repeat)
                .map_err(|e| MonoframeError::encode(format!("gif repeat setting failed: {e}")))?;
            for (idx, (frame, delay)) in frames.iter().zip(durations).enumerate() {
                let rgba = DynamicImage::ImageRgb8(frame.to_rgb_image()?).into_rgba8();
                let delay = Delay::from_numer_denom_ms(delay.as_millis(), 1);
                encoder
                    .encode_frame(image::Frame::from_parts(rgba, 0, 0, delay))
                    .map_err(|e| {
                        MonoframeError::encode(format!("gif frame {idx} write failed: {e}"))
                    })?;
            }
            Ok(())
        })?;

        tracing::info!(out = %out.display(), frames = frames.len(), "wrote animated gif");
        Ok(())
    }

    fn encode_still(&self, frame: &Frame, out: &Path) -> MonoframeResult<()> {
        let format = ImageFormat::from_path(out).unwrap_or(ImageFormat::Png);
        let img = DynamicImage::ImageRgb8(frame.to_rgb_image()?);
        write_atomically(out, |w| {
            img.write_to(w, format).map_err(|e| {
                MonoframeError::encode(format!("failed to write '{}': {e}", out.display()))
            })
        })?;
        tracing::info!(out = %out.display(), "wrote image");
        Ok(())
    }
}

/// Frames without a delay decode as 0 ms and stay 0 cs; viewers pick their own minimum.
fn delay_to_centis(delay: Delay) -> Centis {
    let (num, den) = delay.numer_denom_ms();
    // ms = num / den (den >= 1); centiseconds rounded to nearest.
    Centis(((u64::from(num) + 5 * u64::from(den)) / (10 * u64::from(den))) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_conversion_rounds_to_centis() {
        assert_eq!(delay_to_centis(Delay::from_numer_denom_ms(50, 1)), Centis(5));
        assert_eq!(delay_to_centis(Delay::from_numer_denom_ms(100, 3)), Centis(3));
        assert_eq!(delay_to_centis(Delay::from_numer_denom_ms(0, 1)), Centis(0));
    }

    #[test]
    fn gif_round_trip_keeps_order_and_delays() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("anim.gif");
        let frames = vec![
            Frame::filled(6, 4, [0, 0, 0]),
            Frame::filled(6, 4, [255, 255, 255]),
            Frame::from_fn(6, 4, |x, _| if x % 2 == 0 { [0, 0, 0] } else { [255, 255, 255] }),
        ];
        let durations = vec![Centis(5), Centis(12), Centis(30)];
        ImageCodec
            .encode_animated(&frames, &durations, 0, Canvas::new(6, 4), &out)
            .unwrap();

        let decoded = ImageCodec.decode(&out).unwrap();
        assert_eq!(decoded.canvas, Canvas::new(6, 4));
        assert_eq!(decoded.durations, durations);
        assert_eq!(decoded.frames, frames);
    }

    #[test]
    fn gif_without_delay_decodes_as_zero_and_round_trips() {
        // 1x1 GIF89a with no graphic control extension.
        let bare: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\xff\xff\xff\x00\x00\x00\
            ,\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02D\x01\x00;";
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bare.gif");
        std::fs::write(&input, bare).unwrap();

        let decoded = ImageCodec.decode(&input).unwrap();
        assert_eq!(decoded.durations, vec![Centis(0)]);

        let out = dir.path().join("again.gif");
        let frames = vec![decoded.frames[0].clone(), decoded.frames[0].clone()];
        ImageCodec
            .encode_animated(&frames, &[Centis(0), Centis(4)], 0, decoded.canvas, &out)
            .unwrap();
        assert_eq!(ImageCodec.decode(&out).unwrap().durations, vec![Centis(0), Centis(4)]);
    }

    #[test]
    fn encode_animated_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("bad.gif");
        let f = Frame::filled(2, 2, [0, 0, 0]);
        assert!(
            ImageCodec
                .encode_animated(&[], &[], 0, Canvas::new(2, 2), &out)
                .is_err()
        );
        assert!(
            ImageCodec
                .encode_animated(std::slice::from_ref(&f), &[], 0, Canvas::new(2, 2), &out)
                .is_err()
        );
        assert!(
            ImageCodec
                .encode_animated(&[f], &[Centis(1)], 0, Canvas::new(3, 2), &out)
                .is_err()
        );
        assert!(!out.exists());
    }

    #[test]
    fn png_still_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("still.png");
        let f = Frame::from_fn(5, 3, |x, y| [x as u8 * 40, y as u8 * 80, 9]);
        ImageCodec.encode_still(&f, &out).unwrap();
        let decoded = ImageCodec.decode(&out).unwrap();
        assert_eq!(decoded.frames, vec![f]);
        assert_eq!(decoded.durations.len(), 1);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.bin");
        std::fs::write(&p, b"definitely not an image").unwrap();
        let err = ImageCodec.decode(&p).unwrap_err();
        assert!(matches!(err, MonoframeError::Decode(_)), "{err}");

        let missing = ImageCodec.decode(&dir.path().join("missing.gif")).unwrap_err();
        assert!(matches!(missing, MonoframeError::Decode(_)));
    }
}
