// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/main.rs - 批量筛查主程序
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

mod args;

use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use healthguard::{
  AnalyzerBuilder, FromUrl,
  input::InputWrapper,
  output::OutputWrapper,
  task::{BatchTask, Task, interrupt_flag},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出: {}", args.output);

  let limit = (args.max_images > 0).then_some(args.max_images);
  let stop = interrupt_flag()?;

  for model_url in &args.model {
    let analyzer = AnalyzerBuilder::from_url(model_url)?.build()?;
    info!("开始筛查任务: {}", analyzer.task());

    let input = InputWrapper::from_url(&args.input)?;
    let output = OutputWrapper::from_url(&args.output)?;

    let summary = BatchTask::default()
      .with_limit(limit)
      .with_stop_flag(stop.clone())
      .run_task(input, analyzer, output)?;

    info!(
      "任务完成: 成功 {} / 共 {}",
      summary.succeeded, summary.total
    );
    if stop.load(Ordering::SeqCst) {
      break;
    }
  }

  Ok(())
}
