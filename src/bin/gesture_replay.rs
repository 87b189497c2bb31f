// LumosGestures リプレイツール
// 記録された接触イベントを仮想時計で再生し、認識されたジェスチャーを出力する

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use lumos_gestures::{
    ContactEvent, GestureConfig, GestureEngine, GestureEvent, GestureType, ManualScheduler,
};

#[derive(Debug, Parser)]
#[command(name = "gesture-replay")]
#[command(about = "接触イベントの記録を再生してジェスチャーを認識する")]
struct Cli {
    /// JSON Lines 形式の接触イベント記録 (1行に `at` と接触イベント)
    events: PathBuf,
    /// 設定ファイル (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// 結果を JSON Lines で出力する
    #[arg(long)]
    json: bool,
    /// 期待するジェスチャー種類の一覧 (1行に1つ)。一致しなければ失敗する。
    #[arg(long)]
    expect: Option<PathBuf>,
}

/// 記録の1行
#[derive(Debug, Deserialize)]
struct ReplayRecord {
    /// 記録開始からの時刻 (秒)
    at: f64,
    #[serde(flatten)]
    event: ContactEvent,
}

#[derive(Debug, Serialize)]
struct ReplayOutput<'a> {
    at: f64,
    #[serde(flatten)]
    gesture: &'a GestureEvent,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => GestureConfig::load(path)
            .with_context(|| format!("設定ファイルを読み込めません: {}", path.display()))?,
        None => GestureConfig::default(),
    };

    let records = parse_records(&cli.events)?;
    info!("{} 件の接触イベントを再生します", records.len());

    let recognized = replay(config, &records)?;

    for (at, gesture) in &recognized {
        if cli.json {
            let line = serde_json::to_string(&ReplayOutput {
                at: at.as_secs_f64(),
                gesture,
            })?;
            println!("{}", line);
        } else {
            println!("{}", describe(*at, gesture));
        }
    }

    if let Some(path) = &cli.expect {
        let expected = parse_expectations(path)?;
        let actual: Vec<GestureType> = recognized.iter().map(|(_, g)| g.gesture_type).collect();
        if expected != actual {
            bail!("認識結果が一致しません: 期待値 {:?}, 実際 {:?}", expected, actual);
        }
        info!("期待値と一致しました ({} 件)", actual.len());
    }

    Ok(())
}

/// 記録を読み込み、再生時刻と接触イベントの組にする
fn parse_records(path: &Path) -> Result<Vec<(Duration, ContactEvent)>> {
    let file = File::open(path)
        .with_context(|| format!("記録ファイルを開けません: {}", path.display()))?;

    let mut records: Vec<(Duration, ContactEvent)> = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record: ReplayRecord = serde_json::from_str(line)
            .with_context(|| format!("{}行目を解析できません", index + 1))?;
        // 負値・非有限値・大きすぎる値はすべて拒否される
        let at = match Duration::try_from_secs_f64(record.at) {
            Ok(at) => at,
            Err(_) => bail!("{}行目: 時刻が不正です ({})", index + 1, record.at),
        };
        if let Some((previous, _)) = records.last() {
            if at < *previous {
                bail!("{}行目: 時刻が前の行より前です", index + 1);
            }
        }
        records.push((at, record.event));
    }
    Ok(records)
}

fn parse_expectations(path: &Path) -> Result<Vec<GestureType>> {
    let file = File::open(path)
        .with_context(|| format!("期待値ファイルを開けません: {}", path.display()))?;

    let mut expected = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        expected.push(line.parse::<GestureType>().map_err(anyhow::Error::msg)?);
    }
    Ok(expected)
}

/// 記録を再生し、ジェスチャーをその確定時刻と共に返す
fn replay(
    config: GestureConfig,
    records: &[(Duration, ContactEvent)],
) -> Result<Vec<(Duration, GestureEvent)>> {
    let mut engine = GestureEngine::manual(config)?;
    let mut recognized = Vec::new();

    for (at, event) in records {
        let at = *at;
        fire_due(&mut engine, at, &mut recognized);

        debug!("{:.4}s: {:?}", at.as_secs_f64(), event);
        for gesture in engine.process_event(event) {
            recognized.push((at, gesture));
        }
    }

    // 記録が終わった後に確定するタップなどを流し切る
    while let Some(deadline) = engine.scheduler().next_deadline() {
        fire_due(&mut engine, deadline, &mut recognized);
    }

    Ok(recognized)
}

fn fire_due(
    engine: &mut GestureEngine<ManualScheduler>,
    until: Duration,
    recognized: &mut Vec<(Duration, GestureEvent)>,
) {
    while let Some(token) = engine.scheduler_mut().pop_due(until) {
        let now = engine.now();
        for gesture in engine.fire_timer(&token) {
            recognized.push((now, gesture));
        }
    }
    engine.scheduler_mut().set_now(until);
}

fn describe(at: Duration, gesture: &GestureEvent) -> String {
    let mut line = format!(
        "{:>8.4}s {} {} {} (経過 {:.3}s, 変位 {:.4})",
        at.as_secs_f64(),
        gesture.gesture_type,
        gesture.contact(),
        gesture.source(),
        gesture.event.elapsed,
        gesture.event.displacement(),
    );
    if let Some(direction) = gesture.flick_direction() {
        line.push_str(&format!(" 方向 {:?}", direction));
    }
    line
}
