//! UseCase: ブロードキャスト対象の解決
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ResolveTargetsUseCase::execute() メソッド
//! - 各ブロードキャスト種別ごとの送信先の選定
//!
//! ### なぜこのテストが必要か
//! - タイピング通知が送信者自身に返ってこないことを保証
//! - 指定ユーザーへの送信が接続中ユーザーとの積集合になることを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：テナント全体 / 単一ユーザー / 複数ユーザー / 送信者以外
//! - エッジケース：接続のないユーザー、重複したユーザー指定

use std::{collections::HashSet, sync::Arc};

use crate::domain::{Connection, ConnectionRepository, TenantId, UserId};

/// 送信先の選び方
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastTarget {
    /// テナント内の全接続
    Tenant,
    /// 単一ユーザー（未接続なら対象なし）
    User(UserId),
    /// 指定ユーザーのうち接続中のもの
    Users(Vec<UserId>),
    /// 指定ユーザー以外の全接続
    TenantExcept(UserId),
}

/// ブロードキャスト対象解決のユースケース
pub struct ResolveTargetsUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn ConnectionRepository>,
}

impl ResolveTargetsUseCase {
    /// 新しい ResolveTargetsUseCase を作成
    pub fn new(repository: Arc<dyn ConnectionRepository>) -> Self {
        Self { repository }
    }

    /// 送信先の接続を解決する
    ///
    /// Registry の読み取りロックは返却前に解放される。
    pub async fn execute(
        &self,
        tenant_id: TenantId,
        target: &BroadcastTarget,
    ) -> Vec<Arc<Connection>> {
        match target {
            BroadcastTarget::Tenant => self.repository.connections_in(tenant_id).await,
            BroadcastTarget::User(user_id) => self
                .repository
                .get(tenant_id, *user_id)
                .await
                .into_iter()
                .collect(),
            BroadcastTarget::Users(user_ids) => {
                let wanted: HashSet<UserId> = user_ids.iter().copied().collect();
                self.repository
                    .connections_in(tenant_id)
                    .await
                    .into_iter()
                    .filter(|connection| wanted.contains(&connection.user_id()))
                    .collect()
            }
            BroadcastTarget::TenantExcept(excluded) => self
                .repository
                .connections_in(tenant_id)
                .await
                .into_iter()
                .filter(|connection| connection.user_id() != *excluded)
                .collect(),
        }
    }
}
