//! UseCase 層
//!
//! 接続の登録・切断とブロードキャスト対象の解決を実装するレイヤー。
//! Hub から呼び出され、Domain 層（ConnectionRepository）を操作します。

pub mod connect_client;
pub mod disconnect_client;
pub mod resolve_targets;

pub use connect_client::ConnectClientUseCase;
pub use disconnect_client::DisconnectClientUseCase;
pub use resolve_targets::{BroadcastTarget, ResolveTargetsUseCase};
