// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/model/fixed.rs - 固定输出模型
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

//! 不加载任何模型文件、总是返回同一输出的模型句柄。
//!
//! 用于联调与冒烟测试，例如：
//! `fixed:///?input=1,32,32,3&dtype=u8&scale=0.1&zero_point=128&output=0.1,0.9`

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DeviceTensor, InputKind, ModelHandle, RawOutput, TensorSpec},
};

const DEFAULT_INPUT: [i64; 4] = [1, 224, 224, 3];

#[derive(Error, Debug)]
pub enum FixedModelError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数 {key} 无效: {value}")]
  InvalidQuery { key: String, value: String },
  #[error("输入类型不匹配: 期望 {expected:?}")]
  KindMismatch { expected: InputKind },
  #[error("输入形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  InputShapeMismatch { expected: Vec<i64>, actual: [usize; 4] },
  #[error("尚未设置输入")]
  NoInput,
  #[error("尚未执行推理")]
  NotInvoked,
}

impl FixedModelError {
  fn invalid(key: &str, value: &str) -> Self {
    FixedModelError::InvalidQuery {
      key: key.to_string(),
      value: value.to_string(),
    }
  }
}

pub struct FixedModel {
  input: TensorSpec,
  output: RawOutput,
  has_input: bool,
  invoked: bool,
}

impl FixedModel {
  pub fn new(input: TensorSpec, output: RawOutput) -> Self {
    Self {
      input,
      output,
      has_input: false,
      invoked: false,
    }
  }
}

fn parse_list<T: std::str::FromStr>(key: &str, value: &str) -> Result<Vec<T>, FixedModelError> {
  value
    .split(',')
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(|v| v.parse().map_err(|_| FixedModelError::invalid(key, value)))
    .collect()
}

fn parse_one<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, FixedModelError> {
  value
    .trim()
    .parse()
    .map_err(|_| FixedModelError::invalid(key, value))
}

impl FromUrlWithScheme for FixedModel {
  const SCHEME: &'static str = "fixed";
}

impl FromUrl for FixedModel {
  type Error = FixedModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FixedModelError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut dims = DEFAULT_INPUT.to_vec();
    let mut quantized = false;
    let mut scale = 0.0f32;
    let mut zero_point = 0i32;
    let mut values: Vec<f32> = Vec::new();
    let mut shape: Option<Vec<usize>> = None;

    for (key, value) in url.query_pairs() {
      match &*key {
        "input" => dims = parse_list(&key, &value)?,
        "dtype" => {
          quantized = match &*value {
            "f32" | "float32" => false,
            "u8" | "uint8" => true,
            _ => return Err(FixedModelError::invalid(&key, &value)),
          }
        }
        "scale" => scale = parse_one(&key, &value)?,
        "zero_point" => zero_point = parse_one(&key, &value)?,
        "output" => values = parse_list(&key, &value)?,
        "output_shape" => shape = Some(parse_list(&key, &value)?),
        // 其余参数（labels、warmup 等）由分析器处理
        _ => {}
      }
    }

    let kind = if quantized {
      InputKind::Quantized { scale, zero_point }
    } else {
      InputKind::Float
    };

    let output = match shape {
      Some(shape) => RawOutput::new(shape, values)
        .map_err(|e| FixedModelError::invalid("output_shape", &e.to_string()))?,
      None => RawOutput::from(values),
    };

    info!("固定输出模型: 输入 {:?} {:?}, 输出 {:?}", dims, kind, output);
    Ok(FixedModel::new(TensorSpec { dims, kind }, output))
  }
}

impl ModelHandle for FixedModel {
  type Error = FixedModelError;

  fn input_spec(&self) -> TensorSpec {
    self.input.clone()
  }

  fn output_shape(&self) -> Vec<i64> {
    self.output.shape().iter().map(|d| *d as i64).collect()
  }

  fn set_input(&mut self, input: &DeviceTensor) -> Result<(), Self::Error> {
    if !input.matches_kind(self.input.kind) {
      return Err(FixedModelError::KindMismatch {
        expected: self.input.kind,
      });
    }

    let actual = input.shape();
    let fits = self.input.dims.len() == actual.len()
      && self
        .input
        .dims
        .iter()
        .zip(actual.iter())
        .all(|(declared, got)| *declared <= 0 || *declared as usize == *got);
    if !fits {
      return Err(FixedModelError::InputShapeMismatch {
        expected: self.input.dims.clone(),
        actual,
      });
    }

    debug!("固定输出模型收到输入: {:?}", actual);
    self.has_input = true;
    self.invoked = false;
    Ok(())
  }

  fn invoke(&mut self) -> Result<(), Self::Error> {
    if !self.has_input {
      return Err(FixedModelError::NoInput);
    }
    self.invoked = true;
    Ok(())
  }

  fn output(&mut self) -> Result<RawOutput, Self::Error> {
    if !self.invoked {
      return Err(FixedModelError::NotInvoked);
    }
    Ok(self.output.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn model(url: &str) -> FixedModel {
    FixedModel::from_url(&Url::parse(url).unwrap()).unwrap()
  }

  #[test]
  fn parses_float_model() {
    let m = model("fixed:///?input=1,32,32,3&dtype=f32&output=0.1,0.9");
    assert_eq!(m.input_spec(), TensorSpec::nhwc(1, 32, 32, 3, InputKind::Float));
    assert_eq!(m.output_shape(), vec![1, 2]);
  }

  #[test]
  fn parses_quantized_model() {
    let m = model("fixed:///?input=1,8,8,3&dtype=u8&scale=0.1&zero_point=128&output=10,200");
    assert_eq!(
      m.input_spec().kind,
      InputKind::Quantized {
        scale: 0.1,
        zero_point: 128
      }
    );
  }

  #[test]
  fn explicit_output_shape() {
    let m = model("fixed:///?output=0.4&output_shape=1,1");
    assert_eq!(m.output_shape(), vec![1, 1]);
    assert_eq!(m.input_spec().dims, DEFAULT_INPUT.to_vec());
  }

  #[test]
  fn rejects_bad_query() {
    let url = Url::parse("fixed:///?dtype=f16").unwrap();
    assert!(matches!(
      FixedModel::from_url(&url),
      Err(FixedModelError::InvalidQuery { .. })
    ));
    let url = Url::parse("fixed:///?output=0.1,0.9&output_shape=1,3").unwrap();
    assert!(FixedModel::from_url(&url).is_err());
  }

  #[test]
  fn protocol_order_is_enforced() {
    let mut m = model("fixed:///?input=1,-1,-1,3&output=0.5");
    assert!(matches!(m.invoke(), Err(FixedModelError::NoInput)));
    assert!(matches!(m.output(), Err(FixedModelError::NotInvoked)));

    let input = DeviceTensor::zeros([1, 5, 7, 3], InputKind::Float);
    m.set_input(&input).unwrap();
    m.invoke().unwrap();
    assert_eq!(m.output().unwrap().values(), &[0.5]);
  }

  #[test]
  fn mismatched_input_is_rejected() {
    let mut m = model("fixed:///?input=1,4,4,3&dtype=u8&scale=0.5");
    let wrong_kind = DeviceTensor::zeros([1, 4, 4, 3], InputKind::Float);
    assert!(matches!(
      m.set_input(&wrong_kind),
      Err(FixedModelError::KindMismatch { .. })
    ));

    let wrong_shape = DeviceTensor::zeros(
      [1, 4, 5, 3],
      InputKind::Quantized {
        scale: 0.5,
        zero_point: 0,
      },
    );
    assert!(matches!(
      m.set_input(&wrong_shape),
      Err(FixedModelError::InputShapeMismatch { .. })
    ));
  }
}
