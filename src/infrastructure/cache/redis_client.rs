// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use redis::aio::MultiplexedConnection;
use redis::{FromRedisValue, RedisResult};

/// Redis客户端
///
/// 持有一个多路复用连接，所有操作共享该连接的克隆
#[derive(Clone)]
pub struct RedisClient {
    /// 多路复用连接
    connection: MultiplexedConnection,
}

impl RedisClient {
    /// 创建新的Redis客户端实例
    ///
    /// # 参数
    ///
    /// * `redis_url` - Redis连接URL
    ///
    /// # 返回值
    ///
    /// * `Ok(RedisClient)` - Redis客户端实例
    /// * `Err(RedisError)` - 连接失败
    pub async fn new(redis_url: &str) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self { connection })
    }

    fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    /// 列表长度
    pub async fn llen(&self, key: &str) -> RedisResult<usize> {
        let mut con = self.connection();
        redis::cmd("LLEN").arg(key).query_async(&mut con).await
    }

    /// 读取整个列表
    pub async fn lrange_all<T: FromRedisValue>(&self, key: &str) -> RedisResult<Vec<T>> {
        let mut con = self.connection();
        redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async(&mut con)
            .await
    }

    /// 从 `source` 队首弹出并追加到 `destination` 队尾
    ///
    /// 非阻塞；源列表为空时返回 `None`
    pub async fn lmove_left_right(
        &self,
        source: &str,
        destination: &str,
    ) -> RedisResult<Option<String>> {
        let mut con = self.connection();
        redis::cmd("LMOVE")
            .arg(source)
            .arg(destination)
            .arg("LEFT")
            .arg("RIGHT")
            .query_async(&mut con)
            .await
    }

    /// 批量读取哈希字段
    pub async fn hmget<T: FromRedisValue>(
        &self,
        key: &str,
        fields: &[String],
    ) -> RedisResult<Vec<Option<T>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut con = self.connection();
        redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut con)
            .await
    }

    /// 删除键
    pub async fn del(&self, key: &str) -> RedisResult<()> {
        let mut con = self.connection();
        redis::cmd("DEL").arg(key).query_async(&mut con).await
    }

    /// 执行 Lua 脚本
    pub async fn eval<T: FromRedisValue>(
        &self,
        script: &redis::Script,
        keys: &[String],
        args: &[String],
    ) -> RedisResult<T> {
        let mut con = self.connection();
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }
        invocation.invoke_async(&mut con).await
    }
}
