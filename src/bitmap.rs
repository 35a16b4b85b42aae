//! # 位图与遮罩
//!
//! `Bitmap` 是解码后的 RGBA8 图像；`Mask` 是严格二值的单通道图像。
//! 两者都是对 `image` 缓冲区的薄封装，用类型区分“任意像素”和“已规范化的遮罩”。

use image::{GrayImage, Rgba, RgbaImage};

/// 遮罩中“属于该区域”的取值。
pub const MASK_OPAQUE: u8 = 255;
/// 遮罩中“不属于该区域”的取值。
pub const MASK_TRANSPARENT: u8 = 0;

/// 内存中的 RGBA8 位图。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap(RgbaImage);

impl Bitmap {
    pub fn new(image: RgbaImage) -> Self {
        Self(image)
    }

    /// 以单一颜色填充的位图。
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self(RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    /// 由原始 RGBA 字节构建；长度不符时返回 `None`。
    pub fn from_raw(width: u32, height: u32, bytes: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, bytes).map(Self)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.0.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.0
    }

    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }

    pub fn into_image(self) -> RgbaImage {
        self.0
    }
}

impl From<RgbaImage> for Bitmap {
    fn from(image: RgbaImage) -> Self {
        Self(image)
    }
}

/// 二值遮罩：每个采样只可能是 `MASK_OPAQUE` 或 `MASK_TRANSPARENT`。
///
/// 只能经由 [`crate::mask::normalize`] 构建，因此持有 `Mask` 即意味着二值性成立。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(GrayImage);

impl Mask {
    /// 仅供规范化流程使用：调用方需保证每个采样已二值化。
    pub(crate) fn from_binary(image: GrayImage) -> Self {
        debug_assert!(
            image
                .as_raw()
                .iter()
                .all(|&v| v == MASK_OPAQUE || v == MASK_TRANSPARENT)
        );
        Self(image)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn is_opaque(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] == MASK_OPAQUE
    }

    /// 不透明像素数量，用于日志与测试。
    pub fn coverage(&self) -> usize {
        self.0.as_raw().iter().filter(|&&v| v == MASK_OPAQUE).count()
    }

    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }
}
