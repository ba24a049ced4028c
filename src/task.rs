// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/task.rs - 运行模式：单次、重复基准、批量
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

use std::{
  collections::BTreeMap,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use tracing::{error, info, warn};

use crate::{input::ImageBytes, model::Model, model::RiskLevel, output::Render, report::Report};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 只分析第一张图像
pub struct OneShotTask;

impl<I, IE, M, ME, O, RE> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = Result<ImageBytes, IE>>,
  IE: std::error::Error + Sync + Send + 'static,
  M: Model<Input = [u8], Output = Report, Error = ME>,
  ME: std::error::Error + Sync + Send + 'static,
  O: Render<ImageBytes, Report, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Output = Report;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))??;
    info!("输入图像 {} 读取成功，开始分析...", image.name);
    let now = Instant::now();
    let report = model.infer(image.data.as_slice())?;
    info!("分析完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&image, &report)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(report)
  }
}

const DEFAULT_REPEAT_TIMES: usize = 1000;
const WARMUP_RUNS: usize = 2;

/// 对同一张图像反复推理，统计平均耗时（不计前两次）
#[derive(Debug)]
pub struct RepeatShotTask {
  times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      times: DEFAULT_REPEAT_TIMES,
    }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times.max(WARMUP_RUNS + 1);
    self
  }

  pub fn times(&self) -> usize {
    self.times
  }
}

fn mean_after_warmup(times: &[Duration]) -> Duration {
  let measured = &times[WARMUP_RUNS.min(times.len())..];
  if measured.is_empty() {
    return Duration::ZERO;
  }
  measured.iter().sum::<Duration>() / measured.len() as u32
}

impl<I, IE, M, ME, O, RE> Task<I, M, O> for RepeatShotTask
where
  I: Iterator<Item = Result<ImageBytes, IE>>,
  IE: std::error::Error + Sync + Send + 'static,
  M: Model<Input = [u8], Output = Report, Error = ME>,
  ME: std::error::Error + Sync + Send + 'static,
  O: Render<ImageBytes, Report, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Output = Duration;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))??;
    info!("输入图像 {} 读取成功，开始推理...", image.name);
    let mut times = Vec::with_capacity(self.times);
    let mut last = None;
    for i in 0..self.times {
      let now = Instant::now();
      let report = model.infer(image.data.as_slice())?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(report);
    }

    if let Some(report) = last {
      output.render_result(&image, &report)?;
    }

    let mean = mean_after_warmup(&times);
    warn!("平均推理时间: {:.2?}", mean);
    Ok(mean)
  }
}

/// 批量任务的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
  pub total: usize,
  pub succeeded: usize,
  pub failed: usize,
  pub by_label: BTreeMap<String, usize>,
  pub by_risk: BTreeMap<RiskLevel, usize>,
}

impl BatchSummary {
  fn record(&mut self, report: &Report) {
    self.succeeded += 1;
    *self.by_label.entry(report.condition().to_string()).or_default() += 1;
    *self.by_risk.entry(report.diagnosis.risk_level).or_default() += 1;
  }

  pub fn log(&self) {
    info!(
      "共 {} 张图像，成功 {}，失败 {}",
      self.total, self.succeeded, self.failed
    );
    for (label, count) in &self.by_label {
      info!("  {}: {}", label, count);
    }
    for (risk, count) in &self.by_risk {
      info!("  风险 {}: {}", risk, count);
    }
  }
}

/// 注册 Ctrl-C 处理函数，返回收到信号后置位的标志。每个进程只能调用一次。
pub fn interrupt_flag() -> Result<Arc<AtomicBool>, ctrlc::Error> {
  let flag = Arc::new(AtomicBool::new(false));
  let handler_flag = flag.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    handler_flag.store(true, Ordering::SeqCst);
  })?;
  Ok(flag)
}

/// 逐个分析输入中的所有图像。单张失败只计数，不中断任务。
#[derive(Default, Debug)]
pub struct BatchTask {
  limit: Option<usize>,
  stop: Option<Arc<AtomicBool>>,
}

impl BatchTask {
  pub fn with_limit(mut self, limit: Option<usize>) -> Self {
    self.limit = limit;
    self
  }

  /// 标志置位后处理完当前图像即退出
  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn should_stop(&self) -> bool {
    self.stop.as_ref().is_some_and(|s| s.load(Ordering::SeqCst))
  }
}

impl<I, IE, M, ME, O, RE> Task<I, M, O> for BatchTask
where
  I: Iterator<Item = Result<ImageBytes, IE>>,
  IE: std::error::Error + Sync + Send + 'static,
  M: Model<Input = [u8], Output = Report, Error = ME>,
  ME: std::error::Error + Sync + Send + 'static,
  O: Render<ImageBytes, Report, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Output = BatchSummary;
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let mut summary = BatchSummary::default();

    for item in input {
      summary.total += 1;
      match item {
        Err(e) => {
          error!("读取输入失败: {}", e);
          summary.failed += 1;
        }
        Ok(image) => match model.infer(image.data.as_slice()) {
          Ok(report) => {
            info!(
              "{}: {} ({:.2}, {})",
              image.name,
              report.condition(),
              report.diagnosis.confidence,
              report.diagnosis.risk_level
            );
            output.render_result(&image, &report)?;
            summary.record(&report);
          }
          Err(e) => {
            warn!("{}: 分析失败: {}", image.name, e);
            summary.failed += 1;
          }
        },
      }

      if self.limit.is_some_and(|n| summary.total >= n) {
        info!("达到指定数量 {}, 退出任务循环", summary.total);
        break;
      }
      if self.should_stop() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    summary.log();
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::RefCell, convert::Infallible, io::Cursor};

  use image::{ImageFormat, RgbImage};
  use url::Url;

  use super::*;
  use crate::{FromUrl, analyzer::AnalyzerBuilder};

  #[derive(Default)]
  struct Collect(RefCell<Vec<String>>);

  impl Render<ImageBytes, Report> for &Collect {
    type Error = Infallible;

    fn render_result(&self, source: &ImageBytes, result: &Report) -> Result<(), Self::Error> {
      self
        .0
        .borrow_mut()
        .push(format!("{}:{}", source.name, result.condition()));
      Ok(())
    }
  }

  fn analyzer() -> crate::Analyzer<crate::model::ModelWrapper> {
    let url = Url::parse("fixed:///?input=1,4,4,3&output=0.2,0.8").unwrap();
    AnalyzerBuilder::from_url(&url).unwrap().build().unwrap()
  }

  fn png(name: &str) -> ImageBytes {
    let mut buf = Cursor::new(Vec::new());
    RgbImage::new(6, 6).write_to(&mut buf, ImageFormat::Png).unwrap();
    ImageBytes::new(name, buf.into_inner())
  }

  fn images(items: Vec<ImageBytes>) -> impl Iterator<Item = Result<ImageBytes, std::io::Error>> {
    items.into_iter().map(Ok)
  }

  #[test]
  fn one_shot_uses_first_image() {
    let sink = Collect::default();
    let report = OneShotTask
      .run_task(images(vec![png("a.png"), png("b.png")]), analyzer(), &sink)
      .unwrap();
    assert_eq!(report.condition(), "anemia");
    assert_eq!(*sink.0.borrow(), vec!["a.png:anemia".to_string()]);
  }

  #[test]
  fn one_shot_without_input_fails() {
    let sink = Collect::default();
    assert!(OneShotTask.run_task(images(vec![]), analyzer(), &sink).is_err());
  }

  #[test]
  fn repeat_shot_renders_once() {
    let sink = Collect::default();
    let task = RepeatShotTask::default().with_times(5);
    assert_eq!(task.times(), 5);
    task
      .run_task(images(vec![png("a.png")]), analyzer(), &sink)
      .unwrap();
    assert_eq!(sink.0.borrow().len(), 1);
  }

  #[test]
  fn repeat_times_has_a_floor() {
    assert_eq!(RepeatShotTask::default().with_times(0).times(), WARMUP_RUNS + 1);
  }

  #[test]
  fn mean_skips_warmup_runs() {
    let times = [100, 100, 2, 4].map(Duration::from_millis);
    assert_eq!(mean_after_warmup(&times), Duration::from_millis(3));
    assert_eq!(mean_after_warmup(&times[..1]), Duration::ZERO);
  }

  #[test]
  fn batch_counts_failures_and_labels() {
    let sink = Collect::default();
    let input = vec![
      Ok(png("a.png")),
      Ok(ImageBytes::new("broken.jpg", b"not an image".to_vec())),
      Err(std::io::Error::other("unreadable")),
      Ok(png("c.png")),
    ];
    let summary = BatchTask::default()
      .run_task(input.into_iter(), analyzer(), &sink)
      .unwrap();

    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.by_label.get("anemia"), Some(&2));
    assert_eq!(summary.by_risk.get(&RiskLevel::High), Some(&2));
    assert_eq!(
      *sink.0.borrow(),
      vec!["a.png:anemia".to_string(), "c.png:anemia".to_string()]
    );
  }

  #[test]
  fn batch_honours_stop_flag() {
    let sink = Collect::default();
    let stop = Arc::new(AtomicBool::new(true));
    let summary = BatchTask::default()
      .with_stop_flag(stop)
      .run_task(images(vec![png("a.png"), png("b.png")]), analyzer(), &sink)
      .unwrap();
    assert_eq!(summary.total, 1);
  }

  #[test]
  fn batch_stops_at_limit() {
    let sink = Collect::default();
    let summary = BatchTask::default()
      .with_limit(Some(1))
      .run_task(images(vec![png("a.png"), png("b.png")]), analyzer(), &sink)
      .unwrap();
    assert_eq!(summary.total, 1);
  }
}
