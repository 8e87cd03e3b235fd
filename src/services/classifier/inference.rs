use crate::error::AppError;
use crate::services::image_service;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ndarray::{Array4, ArrayD, ArrayView3, Axis};
use std::fmt;

/// Lanczos3 matches the resampling the classifier was trained with. Switching
/// filters shifts scores enough to change borderline predictions.
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Batch-of-1 model input, layout `[1, H, W, 3]`, values in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    data: Array4<f32>,
}

impl ImageTensor {
    /// Spatial size as `(height, width)`.
    pub fn spatial_dims(&self) -> (usize, usize) {
        let shape = self.data.shape();
        (shape[1], shape[2])
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn view(&self) -> &Array4<f32> {
        &self.data
    }

    /// The single image without its batch axis, `[H, W, 3]`.
    pub fn unbatched(&self) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(0), 0)
    }
}

/// Memory layout a model declares for its image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    Nhwc,
    Nchw,
    /// No batch axis; the pipeline's batch-of-1 is stripped before the run.
    Hwc,
    Chw,
}

impl fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TensorLayout::Nhwc => "NHWC",
            TensorLayout::Nchw => "NCHW",
            TensorLayout::Hwc => "HWC",
            TensorLayout::Chw => "CHW",
        };
        write!(f, "{}", name)
    }
}

/// Declared tensor dimensions; negative values are dynamic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorShape(Vec<i64>);

impl TensorShape {
    pub fn new(dims: Vec<i64>) -> Self {
        Self(dims)
    }

    pub fn dims(&self) -> &[i64] {
        &self.0
    }

    /// `None` for ranks other than 3 or 4. A leading channel axis of 3 means
    /// channels-first unless the trailing axis is also 3.
    pub fn layout(&self) -> Option<TensorLayout> {
        match self.0.as_slice() {
            [_, 3, _, c] if *c != 3 => Some(TensorLayout::Nchw),
            [_, _, _, _] => Some(TensorLayout::Nhwc),
            [3, _, c] if *c != 3 => Some(TensorLayout::Chw),
            [_, _, _] => Some(TensorLayout::Hwc),
            _ => None,
        }
    }

    /// Input size as `(width, height)` when both spatial dims are static.
    pub fn target_size(&self) -> Option<(u32, u32)> {
        let (h, w) = match (self.layout()?, self.0.as_slice()) {
            (TensorLayout::Nhwc, [_, h, w, _]) => (*h, *w),
            (TensorLayout::Nchw, [_, _, h, w]) => (*h, *w),
            (TensorLayout::Hwc, [h, w, _]) => (*h, *w),
            (TensorLayout::Chw, [_, h, w]) => (*h, *w),
            _ => return None,
        };
        if h > 0 && w > 0 {
            Some((u32::try_from(w).ok()?, u32::try_from(h).ok()?))
        } else {
            None
        }
    }

    /// Static size of the last axis, i.e. the class count of a classifier output.
    pub fn num_classes(&self) -> Option<usize> {
        self.0
            .last()
            .copied()
            .filter(|d| *d > 0)
            .and_then(|d| usize::try_from(d).ok())
    }
}

impl ImageTensor {
    /// Rearranges the NHWC pipeline tensor into what the runtime expects.
    pub fn arrange(self, layout: TensorLayout) -> ArrayD<f32> {
        let nhwc = self.data;
        match layout {
            TensorLayout::Nhwc => nhwc.into_dyn(),
            TensorLayout::Nchw => nhwc
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .into_owned()
                .into_dyn(),
            TensorLayout::Hwc => nhwc.index_axis_move(Axis(0), 0).into_dyn(),
            TensorLayout::Chw => nhwc
                .index_axis_move(Axis(0), 0)
                .permuted_axes([2, 0, 1])
                .as_standard_layout()
                .into_owned()
                .into_dyn(),
        }
    }
}

/// Resizes to `target_size` (width, height) and scales pixels to `[0, 1]`.
pub fn to_tensor(image: &DynamicImage, target_size: (u32, u32)) -> Result<ImageTensor, AppError> {
    let rgb = image_service::to_canonical_rgb(image);
    rgb_to_tensor(&rgb, target_size)
}

pub fn rgb_to_tensor(rgb: &RgbImage, target_size: (u32, u32)) -> Result<ImageTensor, AppError> {
    let (width, height) = target_size;
    if width == 0 || height == 0 {
        return Err(AppError::preprocessing(format!(
            "Target size must be non-zero, got {}x{}",
            width, height
        )));
    }
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(AppError::preprocessing("Cannot resize an empty image"));
    }

    let resized = image::imageops::resize(rgb, width, height, RESIZE_FILTER);
    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / 255.0)
        .collect();

    let data = Array4::from_shape_vec((1, height as usize, width as usize, 3), data)
        .map_err(|e| AppError::preprocessing_with("Failed to create tensor", e))?;

    Ok(ImageTensor { data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, Rgb};

    fn photo(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, ((x ^ y) % 256) as u8])
        }))
    }

    #[test]
    fn tensor_has_requested_shape() {
        let tensor = to_tensor(&photo(300, 200), (224, 160)).unwrap();
        assert_eq!(tensor.shape(), &[1, 160, 224, 3]);
        assert_eq!(tensor.spatial_dims(), (160, 224));
        assert_eq!(tensor.unbatched().shape(), &[160, 224, 3]);
    }

    #[test]
    fn values_are_unit_interval() {
        let tensor = to_tensor(&photo(257, 129), (64, 64)).unwrap();
        assert!(tensor.view().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn white_pixel_maps_to_one() {
        let white = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([255])));
        let tensor = to_tensor(&white, (4, 4)).unwrap();
        assert!(tensor.view().iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn layout_from_declared_shape() {
        assert_eq!(TensorShape::new(vec![1, 224, 224, 3]).layout(), Some(TensorLayout::Nhwc));
        assert_eq!(TensorShape::new(vec![-1, 3, 224, 224]).layout(), Some(TensorLayout::Nchw));
        assert_eq!(TensorShape::new(vec![256, 256, 3]).layout(), Some(TensorLayout::Hwc));
        assert_eq!(TensorShape::new(vec![3, 128, 96]).layout(), Some(TensorLayout::Chw));
        assert_eq!(TensorShape::new(vec![1, 15]).layout(), None);
    }

    #[test]
    fn target_size_is_width_then_height() {
        assert_eq!(TensorShape::new(vec![1, 160, 224, 3]).target_size(), Some((224, 160)));
        assert_eq!(TensorShape::new(vec![1, 3, 160, 224]).target_size(), Some((224, 160)));
        assert_eq!(TensorShape::new(vec![1, -1, -1, 3]).target_size(), None);
    }

    #[test]
    fn num_classes_from_last_axis() {
        assert_eq!(TensorShape::new(vec![1, 15]).num_classes(), Some(15));
        assert_eq!(TensorShape::new(vec![1, -1]).num_classes(), None);
    }

    #[test]
    fn arrange_moves_channels_first() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([0, 0, 255]));
        let tensor = rgb_to_tensor(&rgb, (2, 1)).unwrap();

        let nchw = tensor.clone().arrange(TensorLayout::Nchw);
        assert_eq!(nchw.shape(), &[1, 3, 1, 2]);
        assert_eq!(nchw[[0, 0, 0, 0]], 1.0);
        assert_eq!(nchw[[0, 2, 0, 1]], 1.0);
        assert_eq!(nchw[[0, 2, 0, 0]], 0.0);

        let hwc = tensor.clone().arrange(TensorLayout::Hwc);
        assert_eq!(hwc.shape(), &[1, 2, 3]);

        let chw = tensor.arrange(TensorLayout::Chw);
        assert_eq!(chw.shape(), &[3, 1, 2]);
        assert_eq!(chw[[2, 0, 1]], 1.0);
    }

    #[test]
    fn zero_target_is_preprocessing_error() {
        let err = to_tensor(&photo(10, 10), (0, 224)).unwrap_err();
        assert_eq!(err.kind(), "preprocessing");
    }

    #[test]
    fn empty_image_is_preprocessing_error() {
        let err = rgb_to_tensor(&RgbImage::new(0, 0), (8, 8)).unwrap_err();
        assert_eq!(err.kind(), "preprocessing");
    }
}
