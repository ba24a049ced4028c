// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/model.rs - 模型
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 推理入口：分析器、任务注册表都实现该 trait，供任务循环调用。
pub trait Model {
  type Input: ?Sized;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 模型输入的数值类型
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputKind {
  /// float32，取值 [0, 1]
  Float,
  /// 非对称量化的 uint8，`real = (q - zero_point) * scale`
  Quantized { scale: f32, zero_point: i32 },
}

/// 模型声明的输入张量：`[batch, height, width, channels]`，非正数表示动态维度。
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSpec {
  pub dims: Vec<i64>,
  pub kind: InputKind,
}

impl TensorSpec {
  pub fn nhwc(batch: i64, height: i64, width: i64, channels: i64, kind: InputKind) -> Self {
    Self {
      dims: vec![batch, height, width, channels],
      kind,
    }
  }

  fn dim(&self, index: usize) -> Option<usize> {
    self
      .dims
      .get(index)
      .copied()
      .filter(|d| *d > 0)
      .map(|d| d as usize)
  }

  pub fn batch(&self) -> Option<usize> {
    self.dim(0)
  }

  pub fn height(&self) -> Option<usize> {
    self.dim(1)
  }

  pub fn width(&self) -> Option<usize> {
    self.dim(2)
  }

  pub fn channels(&self) -> Option<usize> {
    self.dim(3)
  }

  /// 只接受 4 维且批大小为 1 或动态的输入。
  pub fn validate(&self) -> Result<(), InferenceError> {
    if self.dims.len() != 4 {
      return Err(InferenceError::UnsupportedGeometry(self.dims.clone()));
    }
    if self.batch().is_some_and(|b| b != 1) {
      return Err(InferenceError::UnsupportedGeometry(self.dims.clone()));
    }
    Ok(())
  }
}

/// 单次推理的原始输出
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
  shape: Vec<usize>,
  data: Vec<f32>,
}

impl RawOutput {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, InferenceError> {
    if shape.iter().product::<usize>() != data.len() {
      return Err(InferenceError::OutputShapeMismatch {
        shape,
        len: data.len(),
      });
    }
    Ok(Self { shape, data })
  }

  pub fn scalar(value: f32) -> Self {
    Self {
      shape: Vec::new(),
      data: vec![value],
    }
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn values(&self) -> &[f32] {
    &self.data
  }
}

impl From<Vec<f32>> for RawOutput {
  /// 形状为 `[1, n]`，即带批维度的一维输出。
  fn from(data: Vec<f32>) -> Self {
    Self {
      shape: vec![1, data.len()],
      data,
    }
  }
}

/// 已加载模型的能力接口：`set_input -> invoke -> output` 三步协议。
///
/// 句柄内部有调用状态，三步之间不能被其他调用打断，
/// 因此只通过 [`Executor`] 持锁访问。
pub trait ModelHandle {
  type Error: std::error::Error + Send + Sync + 'static;

  fn input_spec(&self) -> TensorSpec;
  fn output_shape(&self) -> Vec<i64>;
  fn set_input(&mut self, input: &DeviceTensor) -> Result<(), Self::Error>;
  fn invoke(&mut self) -> Result<(), Self::Error>;
  fn output(&mut self) -> Result<RawOutput, Self::Error>;
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("不支持的模型输入形状: {0:?}")]
  UnsupportedGeometry(Vec<i64>),
  #[error("输入通道数不匹配: 模型声明 {expected}, 图像形状 {actual:?}")]
  ChannelMismatch { expected: usize, actual: [usize; 3] },
  #[error("输出形状与数据长度不一致: 形状 {shape:?}, 数据长度 {len}")]
  OutputShapeMismatch { shape: Vec<usize>, len: usize },
  #[error("模型锁已失效")]
  LockPoisoned,
  #[error("模型运行时错误 ({stage}): {source}")]
  Runtime {
    stage: &'static str,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("模型返回了空输出")]
  EmptyOutput,
  #[error("模型输出维度异常: {0:?}")]
  UnexpectedRank(Vec<usize>),
  #[error("模型输出包含非有限数值")]
  NonFiniteOutput,
}

impl InferenceError {
  pub fn runtime<E>(stage: &'static str, err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    InferenceError::Runtime {
      stage,
      source: Box::new(err),
    }
  }
}

mod executor;
mod fixed;
mod interpret;
mod quantize;
#[cfg(feature = "tflite")]
mod tflite;

pub use self::executor::Executor;
pub use self::fixed::{FixedModel, FixedModelError};
pub use self::interpret::{Diagnosis, Interpretation, Labels, RiskLevel, interpret, softmax};
pub use self::quantize::{DeviceTensor, dequantize, quantize, quantize_value};
#[cfg(feature = "tflite")]
pub use self::tflite::{TfliteError, TfliteModel, TfliteModelBuilder};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("固定输出模型错误: {0}")]
  Fixed(#[from] FixedModelError),
  #[cfg(feature = "tflite")]
  #[error("TFLite 模型错误: {0}")]
  Tflite(#[from] TfliteError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的模型后端
pub enum ModelWrapper {
  Fixed(FixedModel),
  #[cfg(feature = "tflite")]
  Tflite(TfliteModel),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      FixedModel::SCHEME => Ok(ModelWrapper::Fixed(FixedModel::from_url(url)?)),
      #[cfg(feature = "tflite")]
      TfliteModelBuilder::SCHEME => {
        let model = TfliteModelBuilder::from_url(url)?.build()?;
        Ok(ModelWrapper::Tflite(model))
      }
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl ModelHandle for ModelWrapper {
  type Error = ModelError;

  fn input_spec(&self) -> TensorSpec {
    match self {
      ModelWrapper::Fixed(model) => model.input_spec(),
      #[cfg(feature = "tflite")]
      ModelWrapper::Tflite(model) => model.input_spec(),
    }
  }

  fn output_shape(&self) -> Vec<i64> {
    match self {
      ModelWrapper::Fixed(model) => model.output_shape(),
      #[cfg(feature = "tflite")]
      ModelWrapper::Tflite(model) => model.output_shape(),
    }
  }

  fn set_input(&mut self, input: &DeviceTensor) -> Result<(), Self::Error> {
    match self {
      ModelWrapper::Fixed(model) => model.set_input(input).map_err(ModelError::from),
      #[cfg(feature = "tflite")]
      ModelWrapper::Tflite(model) => model.set_input(input).map_err(ModelError::from),
    }
  }

  fn invoke(&mut self) -> Result<(), Self::Error> {
    match self {
      ModelWrapper::Fixed(model) => model.invoke().map_err(ModelError::from),
      #[cfg(feature = "tflite")]
      ModelWrapper::Tflite(model) => model.invoke().map_err(ModelError::from),
    }
  }

  fn output(&mut self) -> Result<RawOutput, Self::Error> {
    match self {
      ModelWrapper::Fixed(model) => model.output().map_err(ModelError::from),
      #[cfg(feature = "tflite")]
      ModelWrapper::Tflite(model) => model.output().map_err(ModelError::from),
    }
  }
}
