// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/model/executor.rs - 串行推理执行器
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

use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::model::{DeviceTensor, InferenceError, ModelHandle, RawOutput, TensorSpec};

/// 持有模型句柄及其互斥锁。
///
/// 每个句柄一把锁，任意时刻最多一次调用在进行；
/// 调用方拿不到句柄本身，只能通过 [`Executor::run`] 完成整套三步协议。
pub struct Executor<H> {
  handle: Mutex<H>,
  input_spec: TensorSpec,
  output_shape: Vec<i64>,
}

impl<H: ModelHandle> Executor<H> {
  pub fn new(handle: H) -> Self {
    let input_spec = handle.input_spec();
    let output_shape = handle.output_shape();
    debug!("模型输入: {:?}", input_spec);
    debug!("模型输出形状: {:?}", output_shape);

    Self {
      handle: Mutex::new(handle),
      input_spec,
      output_shape,
    }
  }

  /// 用全零张量跑一次推理，失败只记录日志。
  pub fn with_warmup(self) -> Self {
    match self.warmup() {
      Ok(()) => info!("模型预热完成"),
      Err(e) => warn!("模型预热失败, 继续运行: {}", e),
    }
    self
  }

  pub fn warmup(&self) -> Result<(), InferenceError> {
    // 动态维度按 1 处理
    let dims = &self.input_spec.dims;
    let mut shape = [1usize; 4];
    for (slot, dim) in shape.iter_mut().zip(dims.iter()) {
      if *dim > 0 {
        *slot = *dim as usize;
      }
    }
    let dummy = DeviceTensor::zeros(shape, self.input_spec.kind);
    self.run(&dummy).map(|_| ())
  }

  pub fn input_spec(&self) -> &TensorSpec {
    &self.input_spec
  }

  pub fn output_shape(&self) -> &[i64] {
    &self.output_shape
  }

  pub fn run(&self, input: &DeviceTensor) -> Result<RawOutput, InferenceError> {
    let mut handle = self
      .handle
      .lock()
      .map_err(|_| InferenceError::LockPoisoned)?;

    debug!("设置模型输入: {:?}", input.shape());
    handle
      .set_input(input)
      .map_err(|e| InferenceError::runtime("set_input", e))?;

    debug!("执行模型推理");
    handle
      .invoke()
      .map_err(|e| InferenceError::runtime("invoke", e))?;

    let output = handle
      .output()
      .map_err(|e| InferenceError::runtime("output", e))?;
    debug!("模型推理结果: {:?}", output);

    Ok(output)
  }

  pub fn into_inner(self) -> Result<H, InferenceError> {
    self
      .handle
      .into_inner()
      .map_err(|_| InferenceError::LockPoisoned)
  }
}
