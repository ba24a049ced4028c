// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/registry.rs - 多任务分析器注册表
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

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{info, warn};

use crate::{analyzer::AnalyzeError, model::Model, report::Report};

pub type DynAnalyzer = dyn Model<Input = [u8], Output = Report, Error = AnalyzeError> + Send + Sync;

#[derive(Error, Debug)]
pub enum RegistryError {
  #[error("未注册的任务: {0}")]
  UnknownTask(String),
  #[error(transparent)]
  Analyze(#[from] AnalyzeError),
}

/// 任务名 -> 分析器。每个任务各自持有模型与互斥锁，任务之间可并行。
#[derive(Default)]
pub struct Registry {
  tasks: BTreeMap<String, Box<DynAnalyzer>>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// 同名任务会被替换
  pub fn insert<M>(&mut self, task: impl Into<String>, analyzer: M)
  where
    M: Model<Input = [u8], Output = Report, Error = AnalyzeError> + Send + Sync + 'static,
  {
    let task = task.into();
    if self.tasks.insert(task.clone(), Box::new(analyzer)).is_some() {
      warn!("任务 {} 已存在, 旧分析器被替换", task);
    } else {
      info!("注册任务: {}", task);
    }
  }

  pub fn tasks(&self) -> impl Iterator<Item = &str> {
    self.tasks.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  pub fn analyze(&self, task: &str, image_bytes: &[u8]) -> Result<Report, RegistryError> {
    let analyzer = self
      .tasks
      .get(task)
      .ok_or_else(|| RegistryError::UnknownTask(task.to_string()))?;
    Ok(analyzer.infer(image_bytes)?)
  }

  /// 依次运行所有任务，按任务名排序返回，单个任务失败不影响其他任务。
  pub fn analyze_all(&self, image_bytes: &[u8]) -> Vec<(String, Result<Report, AnalyzeError>)> {
    self
      .tasks
      .iter()
      .map(|(task, analyzer)| (task.clone(), analyzer.infer(image_bytes)))
      .collect()
  }
}
