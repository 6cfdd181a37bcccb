//! 运行监管：每次运行的取消令牌登记表
//!
//! 每个 run 持有根令牌的子令牌；Web 端按 run_id 取消单个运行，进程退出时 `cancel_all` 一次性取消全部。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// run_id → CancellationToken
#[derive(Debug, Clone)]
pub struct RunSupervisor {
    root: CancellationToken,
    runs: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 登记新运行，返回其取消令牌
    pub async fn register(&self, run_id: &str) -> CancellationToken {
        let token = self.root.child_token();
        self.runs
            .write()
            .await
            .insert(run_id.to_string(), token.clone());
        token
    }

    /// 取消指定运行；不存在（已结束）时返回 false
    pub async fn cancel(&self, run_id: &str) -> bool {
        match self.runs.read().await.get(run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 运行结束后注销
    pub async fn remove(&self, run_id: &str) {
        self.runs.write().await.remove(run_id);
    }

    pub async fn active_runs(&self) -> usize {
        self.runs.read().await.len()
    }

    /// 取消所有运行（进程关闭）
    pub fn cancel_all(&self) {
        self.root.cancel();
    }
}

impl Default for RunSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
