use std::path::PathBuf;

use cadview_engine::spatial::Region;
use clap::{Args, Parser, Subcommand};

/// DXF 图纸的范围计算、区域渲染与结构化查询。
#[derive(Debug, Parser)]
#[command(name = "cadview", version, about)]
pub struct Cli {
    /// 配置文件路径，缺省读取 `CADVIEW_CONFIG` 或 `./config/default.toml`。
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 计算可渲染实体的稳健范围。
    Bounds {
        file: PathBuf,
        #[arg(long = "layer")]
        layers: Vec<String>,
    },
    /// 将区域渲染为 PNG。
    Render(RenderArgs),
    /// 渲染区域并统计区域内容。
    Inspect(InspectArgs),
    /// 按条件提取实体。
    Entities(EntitiesArgs),
    /// 图纸概览与缩略图。
    Metadata { file: PathBuf },
}

#[derive(Debug, Clone, Copy, Args)]
pub struct RegionArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub x: f64,
    #[arg(long, allow_negative_numbers = true)]
    pub y: f64,
    #[arg(long, allow_negative_numbers = true)]
    pub width: f64,
    #[arg(long, allow_negative_numbers = true)]
    pub height: f64,
}

impl RegionArgs {
    pub fn region(&self) -> Region {
        Region::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    pub file: PathBuf,
    #[command(flatten)]
    pub region: RegionArgs,
    /// 输出尺寸，形如 `2048x1024`。
    #[arg(long, value_parser = parse_size)]
    pub size: Option<(u32, u32)>,
    #[arg(long = "layer")]
    pub layers: Vec<String>,
    /// 全部使用黑色绘制。
    #[arg(long)]
    pub monochrome: bool,
    /// 不保持宽高比，直接拉伸到请求尺寸。
    #[arg(long)]
    pub stretch: bool,
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    pub file: PathBuf,
    #[command(flatten)]
    pub region: RegionArgs,
    /// 正方形输出边长。
    #[arg(long)]
    pub size: Option<u32>,
    /// 附带 base64 JPEG 预览。
    #[arg(long)]
    pub preview: bool,
}

#[derive(Debug, Args)]
pub struct EntitiesArgs {
    pub file: PathBuf,
    #[arg(long = "type")]
    pub types: Vec<String>,
    #[arg(long = "layer")]
    pub layers: Vec<String>,
    /// 形如 `x,y,width,height`。
    #[arg(long, value_parser = parse_region, allow_hyphen_values = true)]
    pub region: Option<Region>,
    #[arg(long)]
    pub limit: Option<usize>,
}

fn parse_size(raw: &str) -> Result<(u32, u32), String> {
    let (width, height) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("尺寸格式应为 宽x高：{raw}"))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<u32>()
            .map_err(|err| format!("无效尺寸 {value:?}: {err}"))
    };
    Ok((parse(width)?, parse(height)?))
}

fn parse_region(raw: &str) -> Result<Region, String> {
    let values = raw
        .split(',')
        .map(|value| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|err| format!("无效数值 {value:?}: {err}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [x, y, width, height] => Ok(Region::new(*x, *y, *width, *height)),
        _ => Err(format!("区域格式应为 x,y,width,height：{raw}")),
    }
}
