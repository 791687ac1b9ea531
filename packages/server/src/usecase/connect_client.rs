//! UseCase: クライアント接続処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ConnectClientUseCase::execute() メソッド
//! - (tenant, user) ごとに接続が 1 つだけ登録されること
//!
//! ### なぜこのテストが必要か
//! - 再接続時に旧ソケットが閉じられずに残ると、読み取りタスクがリークする
//! - 再接続後も接続数の不変条件（1 キー 1 接続）が保たれることを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：新規接続の登録
//! - エッジケース：同じ (tenant, user) での再接続（旧接続は閉じられる）

use std::{sync::Arc, time::Duration};

use crate::domain::{Connection, ConnectionRepository, ConnectionSink, TenantId, UserId};

/// 旧ソケットのクローズを待つ上限
const REPLACED_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// クライアント接続のユースケース
pub struct ConnectClientUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn ConnectionRepository>,
}

impl ConnectClientUseCase {
    /// 新しい ConnectClientUseCase を作成
    pub fn new(repository: Arc<dyn ConnectionRepository>) -> Self {
        Self { repository }
    }

    /// 接続を登録する
    ///
    /// 同じ (tenant, user) の接続が既にある場合は置き換え、旧ソケットを閉じる。
    /// 旧ソケットのクローズは別タスクで行うため、登録が遅いソケットに待たされることはない。
    ///
    /// # Returns
    ///
    /// 登録された Connection
    pub async fn execute(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        sink: Arc<dyn ConnectionSink>,
    ) -> Arc<Connection> {
        let connection = Arc::new(Connection::new(tenant_id, user_id, sink));

        if let Some(previous) = self.repository.register(connection.clone()).await {
            tracing::info!(
                college_id = %tenant_id,
                user_id = %user_id,
                previous_connection_id = %previous.id(),
                connection_id = %connection.id(),
                "Client reconnected, closing previous connection"
            );
            tokio::spawn(async move {
                match tokio::time::timeout(REPLACED_CLOSE_TIMEOUT, previous.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!("Failed to close replaced connection: {}", e),
                    Err(_) => tracing::debug!(
                        connection_id = %previous.id(),
                        "Timed out closing replaced connection"
                    ),
                }
            });
        }

        connection
    }
}
