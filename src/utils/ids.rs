//! Snowflake id generation for durable records (posts, comments, messages).
//! User ids stay on the DB sequence; everything the feed sorts by creation
//! order gets a time-ordered snowflake.

use ferroid::{
    futures::SnowflakeGeneratorAsyncTokioExt,
    generator::LockSnowflakeGenerator,
    id::SnowflakeTwitterId,
    time::{MonotonicClock, TWITTER_EPOCH},
};

pub type IdGenerator = LockSnowflakeGenerator<SnowflakeTwitterId, MonotonicClock>;

pub fn new_generator(machine_id: u64) -> IdGenerator {
    LockSnowflakeGenerator::new(machine_id, MonotonicClock::with_epoch(TWITTER_EPOCH))
}

pub async fn next_id(generator: &IdGenerator) -> Result<i64, ferroid::generator::Error> {
    let id: SnowflakeTwitterId = generator.try_next_id_async().await?;
    Ok(id.to_raw() as i64)
}
