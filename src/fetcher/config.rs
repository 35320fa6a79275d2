use crate::transport::ReceiveRequest;

/// Max number of messages to work on in a cycle; 10 is the most SQS supports.
pub const BATCH_SIZE: i32 = 10;

/// Max number of seconds to hold a receive request open (long polling).
pub const WAIT_TIME: i32 = 20;

/// Configuration for the queue fetcher's receive calls.
///
/// # Fields
/// - `max_number_of_messages`: The maximum number of messages to receive in a single request.
/// - `wait_time_seconds`: The wait time for long polling, in seconds.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// The maximum number of messages to receive in a single request.
    pub max_number_of_messages: i32,

    /// The wait time for long polling, in seconds.
    pub wait_time_seconds: i32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        FetcherConfig {
            max_number_of_messages: BATCH_SIZE,
            wait_time_seconds: WAIT_TIME,
        }
    }
}

impl FetcherConfig {
    /// Builds the receive request for one cycle.
    ///
    /// The batch size is clamped into `1..=BATCH_SIZE`.
    pub fn receive_request(&self, visibility_timeout: Option<i32>) -> ReceiveRequest {
        ReceiveRequest {
            max_number_of_messages: self.max_number_of_messages.clamp(1, BATCH_SIZE),
            wait_time_seconds: self.wait_time_seconds.max(0),
            visibility_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_requests_more_than_a_full_batch() {
        let config = FetcherConfig {
            max_number_of_messages: 25,
            wait_time_seconds: 5,
        };
        let request = config.receive_request(Some(30));
        assert_eq!(request.max_number_of_messages, BATCH_SIZE);
        assert_eq!(request.wait_time_seconds, 5);
        assert_eq!(request.visibility_timeout, Some(30));

        let request = FetcherConfig::default().receive_request(None);
        assert_eq!(request.max_number_of_messages, 10);
        assert_eq!(request.wait_time_seconds, 20);
        assert_eq!(request.visibility_timeout, None);
    }
}
