//! StackFlow コア
//!
//! インフラをユニット（リソースの集合）として宣言し、
//! CloudFormation テンプレートに合成するためのプロバイダ非依存な基盤。
//!
//! # アーキテクチャ
//!
//! ```text
//! stackflow.kdl ──▶ loader (Tera) ──▶ parser ──▶ Deployment
//!                                                   │
//!                                   stackflow-aws compose
//!                                                   ▼
//!   Unit ─┬─ Resource (Prop, Handle)             App ──▶ synth ──▶ Assembly
//!         └─ Output                               │                  │
//!                                        DependencyGraph     AssemblyStore / diff
//! ```
//!
//! ユニットは先に追加されたユニットのハンドルしか参照できないため、
//! ユニットグラフは常にDAGになり、合成はデプロイ順の1パスで終わる。

pub mod app;
pub mod assembly;
pub mod diff;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod parser;
pub mod synth;
pub mod template;

// 再エクスポート
pub use app::App;
pub use assembly::{Assembly, AssemblyStore, Manifest, ManifestEntry, SynthesizedUnit};
pub use diff::{Change, ChangeType, Plan, PlanSummary, diff_assemblies};
pub use error::{Result, SynthError};
pub use graph::DependencyGraph;
pub use loader::{load_deployment, load_deployment_str};
pub use model::*;
pub use parser::{parse_kdl_file, parse_kdl_string};
pub use template::{TemplateProcessor, Variables};
