// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/frame.rs - 像素帧定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 HealthGuard 开发组

use image::RgbImage;
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
pub struct FrameShapeError {
  pub expected: usize,
  pub actual: usize,
}

/// 三维 8 位像素张量，行优先存储。
///
/// 通道在后时维度为 `[H, W, C]`；从通道在前的数据构造时为 `[C, H, W]`，
/// 需要先调用 [`PixelFrame::to_channels_last`]。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFrame {
  dims: [usize; 3],
  data: Box<[u8]>,
}

impl PixelFrame {
  pub fn with_shape(height: usize, width: usize, channels: usize) -> Self {
    let data = vec![0u8; height * width * channels].into_boxed_slice();
    Self {
      dims: [height, width, channels],
      data,
    }
  }

  pub fn from_raw(dims: [usize; 3], data: Vec<u8>) -> Result<Self, FrameShapeError> {
    let expected = dims.iter().product::<usize>();
    if data.len() != expected {
      return Err(FrameShapeError {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      dims,
      data: data.into_boxed_slice(),
    })
  }

  pub fn dims(&self) -> [usize; 3] {
    self.dims
  }

  pub fn height(&self) -> usize {
    self.dims[0]
  }

  pub fn width(&self) -> usize {
    self.dims[1]
  }

  pub fn channels(&self) -> usize {
    self.dims[2]
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.data
  }

  /// 若末维不是 `channels` 而首维是，则按 CHW -> HWC 转置；否则原样返回。
  /// 末维为 1 或 3 时视为已是 HWC，不按高度误判为通道。
  pub fn to_channels_last(self, channels: usize) -> Self {
    let [d0, d1, d2] = self.dims;
    if d2 == channels || d0 != channels || matches!(d2, 1 | 3) {
      return self;
    }

    let (c_num, height, width) = (d0, d1, d2);
    let mut frame = PixelFrame::with_shape(height, width, c_num);
    let slice = frame.as_mut();

    for c in 0..c_num {
      for h in 0..height {
        for w in 0..width {
          let src = c * height * width + h * width + w;
          let dst = h * width * c_num + w * c_num + c;
          slice[dst] = self.data[src];
        }
      }
    }
    frame
  }
}

impl AsMut<[u8]> for PixelFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl From<RgbImage> for PixelFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      dims: [height as usize, width as usize, RGB_CHANNELS],
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn rgb_image_becomes_hwc() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([1, 2, 3]));
    image.put_pixel(1, 0, Rgb([4, 5, 6]));

    let frame = PixelFrame::from(image);
    assert_eq!(frame.dims(), [1, 2, 3]);
    assert_eq!(frame.as_slice(), &[1, 2, 3, 4, 5, 6]);
  }

  #[test]
  fn channel_first_is_transposed() {
    // C=3, H=1, W=2
    let frame = PixelFrame::from_raw([3, 1, 2], vec![1, 4, 2, 5, 3, 6]).unwrap();
    let frame = frame.to_channels_last(3);
    assert_eq!(frame.dims(), [1, 2, 3]);
    assert_eq!(frame.as_slice(), &[1, 2, 3, 4, 5, 6]);
  }

  #[test]
  fn channel_last_is_untouched() {
    let frame = PixelFrame::from_raw([3, 2, 3], (0..18).collect()).unwrap();
    let same = frame.clone().to_channels_last(3);
    assert_eq!(frame, same);
  }

  #[test]
  fn unrelated_channel_count_is_untouched() {
    let frame = PixelFrame::from_raw([2, 2, 3], (0..12).collect()).unwrap();
    let same = frame.clone().to_channels_last(1);
    assert_eq!(frame, same);
  }

  #[test]
  fn single_row_rgb_is_not_taken_for_chw() {
    // H=1, W=5, C=3
    let frame = PixelFrame::from_raw([1, 5, 3], (0..15).collect()).unwrap();
    let same = frame.clone().to_channels_last(1);
    assert_eq!(same.dims(), [1, 5, 3]);
    assert_eq!(frame, same);
  }

  #[test]
  fn wrong_length_is_rejected() {
    let err = PixelFrame::from_raw([2, 2, 3], vec![0; 5]).unwrap_err();
    assert_eq!(err.expected, 12);
    assert_eq!(err.actual, 5);
  }
}
