// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/model/tflite.rs - TFLite 模型后端
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};
use tract_core::prelude::*;
use tract_tflite::Tflite;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DeviceTensor, InputKind, ModelHandle, RawOutput, TensorSpec, dequantize},
  url_path,
};

#[derive(Error, Debug)]
pub enum TfliteError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("tract 错误: {0}")]
  Tract(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("尚未设置输入")]
  NoInput,
  #[error("尚未执行推理")]
  NotInvoked,
  #[error("模型没有输出")]
  NoOutput,
}

impl TfliteError {
  fn tract(err: TractError) -> Self {
    TfliteError::Tract(format!("{:#}", err))
  }
}

pub struct TfliteModelBuilder {
  model_path: PathBuf,
}

impl FromUrlWithScheme for TfliteModelBuilder {
  const SCHEME: &'static str = "tflite";
}

impl FromUrl for TfliteModelBuilder {
  type Error = TfliteError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TfliteError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(TfliteModelBuilder {
      model_path: url_path(url),
    })
  }
}

fn fact_dims(fact: &TypedFact) -> Vec<i64> {
  fact
    .shape
    .iter()
    .map(|d| d.to_i64().unwrap_or(-1))
    .collect()
}

impl TfliteModelBuilder {
  pub fn build(self) -> Result<TfliteModel, TfliteError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model = Tflite::default()
      .model_for_path(&self.model_path)
      .map_err(TfliteError::tract)?;

    let model = TfliteModel::from_typed(model)?;
    info!("模型加载完成");
    Ok(model)
  }
}

/// 由模型输入的数据类型推出送入的像素类型。
///
/// 像素张量总是 u8，QI8 的零点因此整体平移 128，送入时再平移回来。
fn input_kind(dt: DatumType) -> InputKind {
  if dt.is_float() {
    return InputKind::Float;
  }
  if !dt.is_quantized() {
    // 未量化的整型输入：scale 为 0，直接传像素
    return InputKind::Quantized {
      scale: 0.0,
      zero_point: 0,
    };
  }

  let (zero_point, scale) = dt.zp_scale();
  match dt.unquantized() {
    DatumType::I8 => InputKind::Quantized {
      scale,
      zero_point: zero_point + 128,
    },
    _ => InputKind::Quantized { scale, zero_point },
  }
}

pub struct TfliteModel {
  plan: TypedRunnableModel<TypedModel>,
  input: TensorSpec,
  input_dt: DatumType,
  output_shape: Vec<i64>,
  pending: Option<Tensor>,
  output: Option<Tensor>,
}

impl TfliteModel {
  /// 从已加载的计算图构建，读取首个输入、输出的形状与数据类型后优化。
  pub fn from_typed(model: TypedModel) -> Result<Self, TfliteError> {
    let input_fact = model.input_fact(0).map_err(TfliteError::tract)?.clone();
    let output_fact = model.output_fact(0).map_err(TfliteError::tract)?.clone();

    let input_dt = input_fact.datum_type;
    let input = TensorSpec {
      dims: fact_dims(&input_fact),
      kind: input_kind(input_dt),
    };
    let output_shape = fact_dims(&output_fact);
    debug!("模型输入: {:?} ({:?})", input, input_dt);
    debug!("模型输出形状: {:?} ({:?})", output_shape, output_fact.datum_type);

    let plan = model
      .into_optimized()
      .and_then(|m| m.into_runnable())
      .map_err(TfliteError::tract)?;

    Ok(TfliteModel {
      plan,
      input,
      input_dt,
      output_shape,
      pending: None,
      output: None,
    })
  }

  fn pixel_tensor(&self, shape: &[usize], data: &[u8]) -> TractResult<Tensor> {
    let (zero_point, scale) = self.input_dt.zp_scale();
    let tensor = match self.input_dt {
      DatumType::U8 => return Tensor::from_shape(shape, data),
      DatumType::QU8(_) => Tensor::from_shape(shape, data)?
        .cast_to_dt(DatumType::U8.with_zp_scale(zero_point, scale))?
        .into_owned(),
      DatumType::QI8(_) => {
        let shifted: Vec<i8> = data.iter().map(|&q| (q as i16 - 128) as i8).collect();
        Tensor::from_shape(shape, &shifted[..])?
          .cast_to_dt(DatumType::I8.with_zp_scale(zero_point, scale))?
          .into_owned()
      }
      other => Tensor::from_shape(shape, data)?
        .cast_to_dt(other)?
        .into_owned(),
    };
    Ok(tensor)
  }
}

/// 量化输出按 `(q - zero_point) * scale` 还原，其余按数值转换为 f32。
fn output_values(tensor: &Tensor) -> TractResult<Vec<f32>> {
  let dt = tensor.datum_type();
  if !dt.is_quantized() {
    let tensor = tensor.cast_to::<f32>()?;
    return Ok(tensor.as_slice::<f32>()?.to_vec());
  }

  let (zero_point, scale) = dt.zp_scale();
  match dt.unquantized() {
    DatumType::U8 => Ok(
      tensor
        .as_slice::<u8>()?
        .iter()
        .map(|&q| dequantize(q, scale, zero_point))
        .collect(),
    ),
    DatumType::I8 => Ok(
      tensor
        .as_slice::<i8>()?
        .iter()
        .map(|&q| (q as i32 - zero_point) as f32 * scale)
        .collect(),
    ),
    _ => Ok(
      tensor
        .as_slice::<i32>()?
        .iter()
        .map(|&q| (q - zero_point) as f32 * scale)
        .collect(),
    ),
  }
}

impl ModelHandle for TfliteModel {
  type Error = TfliteError;

  fn input_spec(&self) -> TensorSpec {
    self.input.clone()
  }

  fn output_shape(&self) -> Vec<i64> {
    self.output_shape.clone()
  }

  fn set_input(&mut self, input: &DeviceTensor) -> Result<(), Self::Error> {
    let shape = input.shape();
    let tensor = match input {
      DeviceTensor::Float32 { data, .. } => {
        Tensor::from_shape(&shape, &data[..]).map_err(TfliteError::tract)?
      }
      DeviceTensor::UInt8 { data, .. } => self
        .pixel_tensor(&shape, data)
        .map_err(TfliteError::tract)?,
    };
    self.pending = Some(tensor);
    self.output = None;
    Ok(())
  }

  fn invoke(&mut self) -> Result<(), Self::Error> {
    let tensor = self.pending.take().ok_or(TfliteError::NoInput)?;
    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(TfliteError::tract)?;
    // 只取第一个输出；TValue 不能跨线程，这里转成独立的 Tensor
    let first = outputs.into_iter().next().ok_or(TfliteError::NoOutput)?;
    self.output = Some(first.into_tensor());
    Ok(())
  }

  fn output(&mut self) -> Result<RawOutput, Self::Error> {
    let first = self.output.as_ref().ok_or(TfliteError::NotInvoked)?;
    let data = output_values(first).map_err(TfliteError::tract)?;

    RawOutput::new(first.shape().to_vec(), data).map_err(|e| TfliteError::Tract(e.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use tract_core::ops::identity::Identity;

  use super::*;
  use crate::{
    frame::PixelFrame,
    model::{Executor, quantize},
  };

  const SHAPE: [usize; 4] = [1, 4, 4, 3];

  /// 输入直连输出的最小计算图
  fn passthrough(dt: DatumType) -> TfliteModel {
    let mut model = TypedModel::default();
    let source = model
      .add_source("input", TypedFact::dt_shape(dt, SHAPE))
      .unwrap();
    let output = model.wire_node("identity", Identity, &[source]).unwrap();
    model.set_output_outlets(&output).unwrap();
    TfliteModel::from_typed(model).unwrap()
  }

  fn pixels() -> PixelFrame {
    let data = (0..48u32).map(|i| (i * 5) as u8).collect();
    PixelFrame::from_raw([4, 4, 3], data).unwrap()
  }

  #[test]
  fn quantized_u8_input_round_trips() {
    let scale = 0.0078125;
    let model = passthrough(DatumType::U8.with_zp_scale(128, scale));
    let kind = model.input_spec().kind;
    assert_eq!(
      kind,
      InputKind::Quantized {
        scale,
        zero_point: 128
      }
    );
    assert_eq!(model.output_shape(), vec![1, 4, 4, 3]);

    let input = quantize(&pixels(), kind);
    let output = Executor::new(model).run(&input).unwrap();
    assert_eq!(output.shape(), &SHAPE);

    let expected: Vec<f32> = input
      .as_u8()
      .unwrap()
      .iter()
      .map(|&q| dequantize(q, scale, 128))
      .collect();
    assert_eq!(output.values(), &expected[..]);
  }

  #[test]
  fn quantized_i8_input_shifts_zero_point() {
    let scale = 0.0078125;
    let model = passthrough(DatumType::I8.with_zp_scale(0, scale));
    let kind = model.input_spec().kind;
    assert_eq!(
      kind,
      InputKind::Quantized {
        scale,
        zero_point: 128
      }
    );

    let input = quantize(&pixels(), kind);
    let output = Executor::new(model).run(&input).unwrap();

    let expected: Vec<f32> = input
      .as_u8()
      .unwrap()
      .iter()
      .map(|&q| dequantize(q, scale, 128))
      .collect();
    assert_eq!(output.values(), &expected[..]);
  }

  #[test]
  fn float_input_passes_through() {
    let model = passthrough(DatumType::F32);
    assert_eq!(model.input_spec().kind, InputKind::Float);

    let input = quantize(&pixels(), InputKind::Float);
    let output = Executor::new(model).run(&input).unwrap();
    assert_eq!(output.shape(), &SHAPE);
    assert_eq!(output.values(), input.as_f32().unwrap());
  }

  #[test]
  fn plain_u8_input_keeps_raw_pixels() {
    let model = passthrough(DatumType::U8);
    let kind = model.input_spec().kind;
    assert_eq!(
      kind,
      InputKind::Quantized {
        scale: 0.0,
        zero_point: 0
      }
    );

    let frame = pixels();
    let output = Executor::new(model).run(&quantize(&frame, kind)).unwrap();
    let expected: Vec<f32> = frame.as_slice().iter().map(|&p| p as f32).collect();
    assert_eq!(output.values(), &expected[..]);
  }

  #[test]
  fn output_before_invoke_is_rejected() {
    let mut model = passthrough(DatumType::F32);
    assert!(matches!(model.output(), Err(TfliteError::NotInvoked)));
    assert!(matches!(model.invoke(), Err(TfliteError::NoInput)));
  }
}
