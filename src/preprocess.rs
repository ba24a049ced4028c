// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/preprocess.rs - 图像解码与归一化
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

use std::io::Cursor;

use image::{ImageReader, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  frame::PixelFrame,
  model::{InferenceError, TensorSpec},
};

/// 输入字节无法解码为图像，属于调用方问题
#[derive(Error, Debug)]
pub enum InvalidImageError {
  #[error("图像数据为空")]
  Empty,
  #[error("无法识别的图像格式")]
  UnknownFormat,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  DecodeError(#[from] image::ImageError),
}

/// 按内容识别格式并解码，统一转为 8 位 RGB（去掉 alpha，灰度扩展为三通道）。
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, InvalidImageError> {
  if bytes.is_empty() {
    warn!("收到空的图像数据");
    return Err(InvalidImageError::Empty);
  }

  let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
  let Some(format) = reader.format() else {
    warn!("无法识别图像格式, 数据长度 {}", bytes.len());
    return Err(InvalidImageError::UnknownFormat);
  };

  let image = reader.decode().inspect_err(|e| {
    warn!("图像解码失败 ({:?}): {}", format, e);
  })?;
  debug!(
    "解码图像: {:?} {}x{} {:?}",
    format,
    image.width(),
    image.height(),
    image.color()
  );

  Ok(image.to_rgb8())
}

/// 缩放到模型声明的宽高；任一维为动态时保持原图尺寸。
pub fn resize_to_spec(image: RgbImage, spec: &TensorSpec) -> RgbImage {
  let (Some(height), Some(width)) = (spec.height(), spec.width()) else {
    debug!("模型输入尺寸为动态, 保持原图 {}x{}", image.width(), image.height());
    return image;
  };

  let (width, height) = (width as u32, height as u32);
  if image.dimensions() == (width, height) {
    return image;
  }

  debug!(
    "缩放图像: {}x{} -> {}x{}",
    image.width(),
    image.height(),
    width,
    height
  );
  image::imageops::resize(&image, width, height, FilterType::CatmullRom)
}

/// 让帧的通道维与模型声明一致，必要时从通道在前转置为通道在后。
pub fn fit_channels(frame: PixelFrame, spec: &TensorSpec) -> Result<PixelFrame, InferenceError> {
  let Some(channels) = spec.channels() else {
    return Ok(frame);
  };

  let frame = frame.to_channels_last(channels);
  if frame.channels() != channels {
    return Err(InferenceError::ChannelMismatch {
      expected: channels,
      actual: frame.dims(),
    });
  }
  Ok(frame)
}

/// 已解码的 RGB 图像 -> 符合模型几何形状的 [0, 255] 像素帧
pub fn normalize(image: RgbImage, spec: &TensorSpec) -> Result<PixelFrame, InferenceError> {
  let resized = resize_to_spec(image, spec);
  fit_channels(PixelFrame::from(resized), spec)
}
