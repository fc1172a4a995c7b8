use std::process::ExitCode;

use anyhow::Context;
use cadview_config::AppConfig;
use cadview_engine::inspect::EntityQuery;
use cadview_engine::spatial::LayerFilter;
use cadview_render::ColorMode;
use cadview_tools::{CadToolkit, InspectParams, ToolReply, load_app_config};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod cli;

use cli::{Cli, Command};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_app_config(cli.config.as_deref());
    init_logging(&config);
    info!("启动 cadview");

    let tools = CadToolkit::new(config);
    match cli.command {
        Command::Bounds { file, layers } => {
            emit(ToolReply::from_result(tools.bounds(&file, &LayerFilter::only(layers))))
        }
        Command::Render(args) => {
            let mut request = tools
                .render_request(args.region.region())
                .with_layers(LayerFilter::only(args.layers));
            if let Some(size) = args.size {
                request.output_size = size;
            }
            if args.monochrome {
                request = request.with_color_mode(ColorMode::Monochrome);
            }
            if args.stretch {
                request = request.with_aspect_ratio(false);
            }
            if let Some(path) = args.output {
                request = request.with_output_path(path);
            }
            emit(ToolReply::from_result(tools.render(&args.file, &request)))
        }
        Command::Inspect(args) => {
            let params = InspectParams {
                region: args.region.region(),
                output_size: args.size,
                include_preview: args.preview,
            };
            emit(ToolReply::from_result(tools.inspect(&args.file, &params)))
        }
        Command::Entities(args) => {
            let mut query = EntityQuery::new()
                .with_types(&args.types)
                .with_layers(LayerFilter::only(args.layers));
            if let Some(region) = args.region {
                query = query.within(region);
            }
            emit(ToolReply::from_result(tools.extract(&args.file, &query, args.limit)))
        }
        Command::Metadata { file } => emit(ToolReply::from_result(tools.metadata(&file))),
    }
}

/// 结果以 JSON 输出到 stdout；失败记录返回退出码 1。
fn emit<T: Serialize>(reply: ToolReply<T>) -> anyhow::Result<ExitCode> {
    let json = serde_json::to_string_pretty(&reply).context("序列化输出失败")?;
    println!("{json}");
    if reply.success {
        Ok(ExitCode::SUCCESS)
    } else {
        if let Some(error) = &reply.error {
            warn!(error = %error, "工具执行失败");
        }
        Ok(ExitCode::FAILURE)
    }
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.clone()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
