// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/model/quantize.rs - 输入张量量化
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

use crate::{frame::PixelFrame, model::InputKind};

const PIXEL_MAX: f32 = 255.0;

/// 送入模型的张量，形状固定为 `[1, H, W, C]`（NHWC）。
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceTensor {
  Float32 { shape: [usize; 4], data: Box<[f32]> },
  UInt8 { shape: [usize; 4], data: Box<[u8]> },
}

impl DeviceTensor {
  /// 全零张量，用于预热
  pub fn zeros(shape: [usize; 4], kind: InputKind) -> Self {
    let len = shape.iter().product::<usize>();
    match kind {
      InputKind::Float => DeviceTensor::Float32 {
        shape,
        data: vec![0.0; len].into_boxed_slice(),
      },
      InputKind::Quantized { .. } => DeviceTensor::UInt8 {
        shape,
        data: vec![0; len].into_boxed_slice(),
      },
    }
  }

  pub fn shape(&self) -> [usize; 4] {
    match self {
      DeviceTensor::Float32 { shape, .. } | DeviceTensor::UInt8 { shape, .. } => *shape,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      DeviceTensor::Float32 { data, .. } => data.len(),
      DeviceTensor::UInt8 { data, .. } => data.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn as_f32(&self) -> Option<&[f32]> {
    match self {
      DeviceTensor::Float32 { data, .. } => Some(data),
      DeviceTensor::UInt8 { .. } => None,
    }
  }

  pub fn as_u8(&self) -> Option<&[u8]> {
    match self {
      DeviceTensor::UInt8 { data, .. } => Some(data),
      DeviceTensor::Float32 { .. } => None,
    }
  }

  /// 数值类型是否与模型声明一致
  pub fn matches_kind(&self, kind: InputKind) -> bool {
    matches!(
      (self, kind),
      (DeviceTensor::Float32 { .. }, InputKind::Float)
        | (DeviceTensor::UInt8 { .. }, InputKind::Quantized { .. })
    )
  }
}

/// `q = round((p / 255) / scale + zero_point)`，截断到 [0, 255]。
/// 舍入采用“四舍六入五成双”。
pub fn quantize_value(pixel: u8, scale: f32, zero_point: i32) -> u8 {
  let normalized = pixel as f32 / PIXEL_MAX;
  let q = (normalized / scale + zero_point as f32).round_ties_even();
  q.clamp(0.0, PIXEL_MAX) as u8
}

pub fn dequantize(value: u8, scale: f32, zero_point: i32) -> f32 {
  (value as i32 - zero_point) as f32 * scale
}

/// 将 [0, 255] 像素帧转换为模型需要的数值类型，并加上批维度。
pub fn quantize(frame: &PixelFrame, kind: InputKind) -> DeviceTensor {
  let shape = [1, frame.height(), frame.width(), frame.channels()];
  let pixels = frame.as_slice();

  match kind {
    InputKind::Float => DeviceTensor::Float32 {
      shape,
      data: pixels.iter().map(|&p| p as f32 / PIXEL_MAX).collect(),
    },
    // scale 为 0 时量化参数无效，直接传原始像素
    InputKind::Quantized { scale, .. } if scale == 0.0 => DeviceTensor::UInt8 {
      shape,
      data: pixels.into(),
    },
    InputKind::Quantized { scale, zero_point } => DeviceTensor::UInt8 {
      shape,
      data: pixels
        .iter()
        .map(|&p| quantize_value(p, scale, zero_point))
        .collect(),
    },
  }
}
