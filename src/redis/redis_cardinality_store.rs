use async_trait::async_trait;
use redis::Value;

use crate::{
    CardinalityError, CardinalityStore, ReadBatch, ReadResult, WriteBatch, WriteCommand,
    redis::RedisClient,
};

/// [`CardinalityStore`] backed by Redis.
///
/// Each batch is sent as one non-transactional pipeline:
///
/// - reads: one `MGET` over the unit flags, then one `SCARD` per bucket set
/// - writes: `SETEX` per flag, `SADD` per member chunk, `EXPIRE` per set
///
/// The pipeline runs its commands in order on the server but other clients
/// can interleave. A failure part way through may leave some writes applied;
/// nothing is rolled back or retried.
///
/// # Requirements
///
/// - **Redis version:** >= 2.6 (all commands used are basic key/set commands)
/// - **Runtime:** Tokio
#[derive(Clone, Debug)]
pub struct RedisCardinalityStore {
    client: RedisClient,
}

impl RedisCardinalityStore {
    /// Create a store issuing its pipelines through `client`.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    fn build_read_pipeline(batch: &ReadBatch) -> redis::Pipeline {
        let mut pipe = redis::pipe();

        if !batch.unit_keys.is_empty() {
            pipe.cmd("MGET").arg(&batch.unit_keys);
        }

        for key in &batch.set_keys {
            pipe.cmd("SCARD").arg(key);
        }

        pipe
    }

    fn build_write_pipeline(batch: &WriteBatch) -> redis::Pipeline {
        let mut pipe = redis::pipe();

        for command in batch.commands() {
            match command {
                WriteCommand::SetFlag { key, ttl_seconds } => {
                    pipe.cmd("SETEX").arg(key).arg(*ttl_seconds).arg(1).ignore();
                }
                WriteCommand::AddMembers { key, members } => {
                    pipe.cmd("SADD").arg(key).arg(members.as_slice()).ignore();
                }
                WriteCommand::Expire { key, ttl_seconds } => {
                    pipe.cmd("EXPIRE").arg(key).arg(*ttl_seconds).ignore();
                }
            }
        }

        pipe
    }

    fn parse_read_reply(
        batch: &ReadBatch,
        replies: Vec<Value>,
    ) -> Result<ReadResult, CardinalityError> {
        let mut replies = replies.into_iter();

        let seen = if batch.unit_keys.is_empty() {
            Vec::new()
        } else {
            match replies.next() {
                Some(Value::Array(values)) => values
                    .into_iter()
                    .map(|value| !matches!(value, Value::Nil))
                    .collect(),
                other => {
                    return Err(CardinalityError::UnexpectedStoreReply(format!(
                        "expected MGET array, got {other:?}"
                    )));
                }
            }
        };

        let set_sizes = replies
            .map(|reply| match reply {
                Value::Int(count) => Ok(count.max(0) as u64),
                other => Err(CardinalityError::UnexpectedStoreReply(format!(
                    "expected SCARD integer, got {other:?}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReadResult { seen, set_sizes })
    }
}

#[async_trait]
impl CardinalityStore for RedisCardinalityStore {
    async fn read(&self, batch: &ReadBatch) -> Result<ReadResult, CardinalityError> {
        let mut connection_manager = self.client.get();

        let pipe = Self::build_read_pipeline(batch);

        let replies: Vec<Value> = match pipe.query_async(&mut connection_manager).await {
            Ok(replies) => replies,
            Err(err) => {
                tracing::error!("redis.read.error, error executing pipeline: {:?}", err);
                return Err(CardinalityError::RedisError(err));
            }
        };

        Self::parse_read_reply(batch, replies)
    } // end method read

    async fn write(&self, batch: &WriteBatch) -> Result<(), CardinalityError> {
        let mut connection_manager = self.client.get();

        let pipe = Self::build_write_pipeline(batch);

        if let Err::<(), _>(err) = pipe.query_async(&mut connection_manager).await {
            tracing::error!("redis.commit.error, error executing pipeline: {:?}", err);
            return Err(CardinalityError::RedisError(err));
        }

        Ok(())
    } // end method write
}
