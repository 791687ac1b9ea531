//! UseCase: クライアント切断処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - DisconnectClientUseCase::execute() メソッド
//! - 読み取りループ終了時のクリーンアップ（Registry からの削除とソケットのクローズ）
//!
//! ### なぜこのテストが必要か
//! - 切断理由（エラー・クローズ・停止）に関わらず必ず後始末されることを保証
//! - 再接続で置き換えられた旧接続の後始末が新しい接続を消さないことを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：登録中の接続の切断
//! - エッジケース：既に置き換えられた接続の切断（Registry は変更しない）

use std::sync::Arc;

use crate::domain::{Connection, ConnectionRepository};

/// クライアント切断のユースケース
pub struct DisconnectClientUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn ConnectionRepository>,
}

impl DisconnectClientUseCase {
    /// 新しい DisconnectClientUseCase を作成
    pub fn new(repository: Arc<dyn ConnectionRepository>) -> Self {
        Self { repository }
    }

    /// 切断を実行
    ///
    /// Registry のエントリがこの接続のものである場合のみ削除し、ソケットは常に閉じる。
    /// 何度呼んでも安全。
    ///
    /// # Returns
    ///
    /// Registry から削除した場合は `true`
    pub async fn execute(&self, connection: &Connection) -> bool {
        let removed = self
            .repository
            .unregister_connection(connection.tenant_id(), connection.user_id(), connection.id())
            .await
            .is_some();

        if let Err(e) = connection.close().await {
            tracing::debug!(
                connection_id = %connection.id(),
                "Socket already closed during cleanup: {}",
                e
            );
        }

        removed
    }
}
