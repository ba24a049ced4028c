// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/args.rs - 批量筛查程序参数
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

use clap::Parser;
use url::Url;

/// HealthGuard 批量筛查
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型 URL，可重复指定以依次运行多个筛查任务
  /// 例如:
  /// - tflite:///models/anemia.tflite?task=anemia&labels=normal,anemia&warmup
  /// - fixed:///?input=1,224,224,3&output=0.1,0.9
  #[arg(long, value_name = "MODEL", required = true)]
  pub model: Vec<Url>,

  /// 输入来源
  /// - 目录: folder:///path/to/images
  /// - 单个文件: image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出
  /// - stdout:// 或 stdout://?pretty
  /// - folder:///path/to/records?min_risk=medium&image
  #[arg(long, default_value = "stdout://", value_name = "OUTPUT")]
  pub output: Url,

  /// 每个任务最多处理的图像数（0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_images: usize,
}
