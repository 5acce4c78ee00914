// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 批量标注 (Batch annotator)
///
/// 读取逐帧检测结果, 按命令脚本修正标注, 导出按帧号排序的JSON。
///
/// 检测文件格式 (JSON Lines, 每行一帧):
/// {"frame": 0, "detections": [{"class": "person", "confidence": 0.91, "bbox": [x1, y1, x2, y2]}]}
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use yolo_annotator::annotation::parse_command_script;
use yolo_annotator::config::{load_class_vocabulary, AnnotatorConfig};
use yolo_annotator::detection::RecordedDetections;
use yolo_annotator::{timestamped_path, AnnotationSession, FrameProcessor};

/// 标注参数
#[derive(Parser, Debug)]
#[command(author, version, about = "YOLO 检测结果标注与导出", long_about = None)]
struct Args {
    /// 逐帧检测结果 (JSON Lines)
    #[arg(short, long)]
    detections: PathBuf,

    /// 命令脚本: 每行 `<frame> <command> <args..>`
    #[arg(long)]
    commands: Option<PathBuf>,

    /// 配置文件
    #[arg(long, default_value = "annotator.json")]
    config: PathBuf,

    /// 导出文件 (默认取配置)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 导出文件名追加时间戳
    #[arg(long, default_value_t = false)]
    timestamp: bool,

    /// 置信度阈值 (0-100)
    #[arg(long)]
    conf: Option<f32>,

    /// 初始类别过滤 (逗号分隔)
    #[arg(long)]
    classes: Option<String>,

    /// 画面宽度 (移动框时的边界)
    #[arg(long)]
    frame_width: Option<u32>,

    /// 画面高度
    #[arg(long)]
    frame_height: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = AnnotatorConfig::load(&args.config)?;
    if let Some(conf) = args.conf {
        config.confidence_threshold_percent = conf;
    }
    if let Some(w) = args.frame_width {
        config.frame_width = w;
    }
    if let Some(h) = args.frame_height {
        config.frame_height = h;
    }
    config.log_summary();

    let vocabulary = config
        .classes_path
        .as_deref()
        .map(|path| load_class_vocabulary(path))
        .unwrap_or_default();

    let mut processor = FrameProcessor::from_config(&config, vocabulary)?;
    if let Some(classes) = &args.classes {
        let selected: BTreeSet<String> = classes
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        processor.set_class_filter(selected)?;
    }

    let schedule = match &args.commands {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read command script {}", path.display()))?;
            parse_command_script(&text)?
        }
        None => Vec::new(),
    };

    let source = RecordedDetections::load(&args.detections)?;
    println!("🚀 标注开始: {} 帧, {} 条命令", source.len(), schedule.len());

    let mut output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.export_path));
    if args.timestamp {
        output = timestamped_path(&output);
    }

    let mut session = AnnotationSession::new(processor, source).with_schedule(schedule);
    let summary = session.run_and_export(&output, config.export_indent)?;

    println!(
        "✅ 完成: {} 帧, {} 条命令成功, {} 条失败 → {}",
        summary.frames_processed,
        summary.commands_applied,
        summary.commands_failed,
        output.display()
    );
    Ok(())
}
