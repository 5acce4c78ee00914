// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 用户命令 (UI → 标注核心)
//!
//! 命令经 crossbeam 通道排队, 只在两帧之间 (Idle 状态) 被消费。

use std::collections::{BTreeSet, HashMap};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use once_cell::sync::Lazy;

use crate::detection::{BoundingBox, MoveDirection};
use crate::error::{AnnotationError, AnnotationResult};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateBox {
        bbox: BoundingBox,
        class_label: String,
        /// 缺省时取配置的默认持续帧数
        duration_frames: Option<u32>,
    },
    DeleteBox(u32),
    RestoreBox(u32),
    RenameBox {
        old_id: u32,
        new_id: u32,
        apply_to_future: bool,
    },
    MoveBox {
        id: u32,
        direction: MoveDirection,
        pixels: i32,
        duration_frames: Option<u32>,
    },
    /// 百分比 0–100
    SetConfidenceThreshold(f32),
    /// 空集合 = 关闭过滤
    SetClassFilter(BTreeSet<String>),
    Seek(u64),
}

/// 命令执行结果
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    Created(u32),
    Deleted(u32),
    Restored(u32),
    Renamed { old_id: u32, new_id: u32 },
    Moved { old_id: u32, new_id: u32 },
    ThresholdSet(f32),
    FilterSet(BTreeSet<String>),
    /// 调用方需将视频源定位到该帧
    Seeked(u64),
}

/// 命令队列
pub struct CommandQueue {
    tx: Sender<Command>,
    rx: Receiver<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// UI线程持有的发送端
    pub fn sender(&self) -> Sender<Command> {
        self.tx.clone()
    }

    pub fn push(&self, command: Command) {
        // 队列自身持有接收端, 发送不会失败
        let _ = self.tx.send(command);
    }

    /// 取出当前所有待处理命令
    pub fn drain(&self) -> Vec<Command> {
        let mut pending = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(command) => pending.push(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        pending
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ========== 命令脚本 ==========

/// 脚本中的一条命令: `at_frame` 处理完成后 (显示期间) 入队
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledCommand {
    pub at_frame: u64,
    pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Keyword {
    Create,
    Delete,
    Restore,
    Rename,
    Move,
    Conf,
    Filter,
    Seek,
}

static KEYWORDS: Lazy<HashMap<&'static str, Keyword>> = Lazy::new(|| {
    HashMap::from([
        ("create", Keyword::Create),
        ("delete", Keyword::Delete),
        ("restore", Keyword::Restore),
        ("rename", Keyword::Rename),
        ("move", Keyword::Move),
        ("conf", Keyword::Conf),
        ("filter", Keyword::Filter),
        ("seek", Keyword::Seek),
    ])
});

fn parse_num<T: std::str::FromStr>(token: Option<&&str>, what: &str, line_no: usize) -> AnnotationResult<T> {
    let token = token.ok_or_else(|| AnnotationError::invalid(format!("line {}: missing {}", line_no, what)))?;
    token
        .parse::<T>()
        .map_err(|_| AnnotationError::invalid(format!("line {}: '{}' is not a valid {}", line_no, token, what)))
}

/// 可省略的数值参数
fn parse_opt_num<T: std::str::FromStr>(token: Option<&&str>, what: &str, line_no: usize) -> AnnotationResult<Option<T>> {
    match token {
        Some(_) => parse_num(token, what, line_no).map(Some),
        None => Ok(None),
    }
}

fn parse_id(token: Option<&&str>, line_no: usize) -> AnnotationResult<u32> {
    let id: u32 = parse_num(token, "id", line_no)?;
    if id == 0 {
        return Err(AnnotationError::invalid(format!("line {}: ids start at 1", line_no)));
    }
    Ok(id)
}

/// 解析一行: `<frame> <command> <args..>`
///
/// create/move 的末尾帧数可省略
pub fn parse_command_line(line: &str, line_no: usize) -> AnnotationResult<Option<ScheduledCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let at_frame: u64 = parse_num(tokens.first(), "frame number", line_no)?;
    let name = tokens
        .get(1)
        .ok_or_else(|| AnnotationError::invalid(format!("line {}: missing command", line_no)))?;
    let keyword = KEYWORDS
        .get(name.to_lowercase().as_str())
        .copied()
        .ok_or_else(|| AnnotationError::invalid(format!("line {}: unknown command '{}'", line_no, name)))?;
    let args = &tokens[2..];

    let command = match keyword {
        Keyword::Create => {
            let x1: f32 = parse_num(args.first(), "x1", line_no)?;
            let y1: f32 = parse_num(args.get(1), "y1", line_no)?;
            let x2: f32 = parse_num(args.get(2), "x2", line_no)?;
            let y2: f32 = parse_num(args.get(3), "y2", line_no)?;
            let class_label = args
                .get(4)
                .ok_or_else(|| AnnotationError::invalid(format!("line {}: missing class", line_no)))?;
            let duration_frames = parse_opt_num(args.get(5), "frame count", line_no)?;
            Command::CreateBox {
                bbox: BoundingBox::new(x1, y1, x2, y2),
                class_label: class_label.to_string(),
                duration_frames,
            }
        }
        Keyword::Delete => Command::DeleteBox(parse_id(args.first(), line_no)?),
        Keyword::Restore => Command::RestoreBox(parse_id(args.first(), line_no)?),
        Keyword::Rename => Command::RenameBox {
            old_id: parse_id(args.first(), line_no)?,
            new_id: parse_id(args.get(1), line_no)?,
            apply_to_future: args.get(2).is_some_and(|t| t.eq_ignore_ascii_case("future")),
        },
        Keyword::Move => {
            let id = parse_id(args.first(), line_no)?;
            let direction: MoveDirection = args
                .get(1)
                .ok_or_else(|| AnnotationError::invalid(format!("line {}: missing direction", line_no)))?
                .parse()?;
            Command::MoveBox {
                id,
                direction,
                pixels: parse_num(args.get(2), "pixel count", line_no)?,
                duration_frames: parse_opt_num(args.get(3), "frame count", line_no)?,
            }
        }
        Keyword::Conf => Command::SetConfidenceThreshold(parse_num(args.first(), "percent", line_no)?),
        Keyword::Filter => {
            let list = args.join(" ");
            let classes = if list.trim().eq_ignore_ascii_case("off") {
                BTreeSet::new()
            } else {
                list.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            };
            Command::SetClassFilter(classes)
        }
        Keyword::Seek => Command::Seek(parse_num(args.first(), "frame number", line_no)?),
    };

    Ok(Some(ScheduledCommand { at_frame, command }))
}

/// 解析整个脚本, 按帧号稳定排序
pub fn parse_command_script(text: &str) -> AnnotationResult<Vec<ScheduledCommand>> {
    let mut scheduled = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if let Some(cmd) = parse_command_line(line, idx + 1)? {
            scheduled.push(cmd);
        }
    }
    scheduled.sort_by_key(|c| c.at_frame);
    Ok(scheduled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_queue_drains_in_order() {
        let queue = CommandQueue::new();
        let ui = queue.sender();
        ui.send(Command::DeleteBox(1)).unwrap();
        queue.push(Command::RestoreBox(1));
        assert_eq!(queue.len(), 2);

        assert_eq!(
            queue.drain(),
            vec![Command::DeleteBox(1), Command::RestoreBox(1)]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_parse_script() {
        let script = "\
# frame command args
12 move 4 right 10 5
3 create 10 20 110 220 person 30
3 rename 3 7 future
5 filter person, car
6 filter off
7 conf 40
";
        let cmds = parse_command_script(script).unwrap();
        assert_eq!(cmds.len(), 6);
        assert_eq!(cmds[0].at_frame, 3);
        assert_eq!(
            cmds[0].command,
            Command::CreateBox {
                bbox: BoundingBox::new(10.0, 20.0, 110.0, 220.0),
                class_label: "person".to_string(),
                duration_frames: Some(30),
            }
        );
        assert_eq!(
            cmds[1].command,
            Command::RenameBox { old_id: 3, new_id: 7, apply_to_future: true }
        );
        assert_eq!(
            cmds[2].command,
            Command::SetClassFilter(BTreeSet::from(["person".to_string(), "car".to_string()]))
        );
        assert_eq!(cmds[3].command, Command::SetClassFilter(BTreeSet::new()));
        assert_eq!(cmds[4].command, Command::SetConfidenceThreshold(40.0));
        assert_eq!(
            cmds[5].command,
            Command::MoveBox { id: 4, direction: MoveDirection::Right, pixels: 10, duration_frames: Some(5) }
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_matches!(parse_command_line("x delete 1", 1), Err(AnnotationError::InvalidInput(_)));
        assert_matches!(parse_command_line("1 delete abc", 2), Err(AnnotationError::InvalidInput(_)));
        assert_matches!(parse_command_line("1 delete 0", 3), Err(AnnotationError::InvalidInput(_)));
        assert_matches!(parse_command_line("1 jump 3", 4), Err(AnnotationError::InvalidInput(_)));
        assert_matches!(parse_command_line("1 move 2 sideways 3 4", 5), Err(AnnotationError::InvalidInput(_)));
        assert_matches!(parse_command_line("1 create 0 0 1 1", 6), Err(AnnotationError::InvalidInput(_)));
        assert_matches!(parse_command_line("1 create 0 0 1 1 dog x", 6), Err(AnnotationError::InvalidInput(_)));
        assert_eq!(parse_command_line("   ", 7).unwrap(), None);
    }

    #[test]
    fn test_parse_duration_is_optional() {
        let create = parse_command_line("4 create 0 0 10 10 dog", 1).unwrap().unwrap();
        assert_eq!(
            create.command,
            Command::CreateBox {
                bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                class_label: "dog".to_string(),
                duration_frames: None,
            }
        );
        let moved = parse_command_line("4 move 2 up 3", 2).unwrap().unwrap();
        assert_eq!(
            moved.command,
            Command::MoveBox { id: 2, direction: MoveDirection::Up, pixels: 3, duration_frames: None }
        );
    }
}
