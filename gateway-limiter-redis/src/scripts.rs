//! Lua scripts executed server-side so that each `allow` call is one atomic
//! round trip (spec §9, "do not decompose into separate GET/SET round-trips").
//!
//! Every script returns `{allowed, remaining, reset_unix, retry_after_ms}`
//! and uses Redis's own `TIME` command for `now` so that clock skew between
//! gateway instances never enters the admission decision.

/// `KEYS[1]` = hash key. `ARGV = [capacity, rate_per_sec, n, ttl_secs]`.
pub const TOKEN_BUCKET: &str = r#"
local capacity = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local n = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local t = redis.call('TIME')
local now = tonumber(t[1]) + tonumber(t[2]) / 1e6

local data = redis.call('HMGET', KEYS[1], 'tokens', 'last_refill')
local tokens = tonumber(data[1])
local last_refill = tonumber(data[2])
if tokens == nil then
  tokens = capacity
  last_refill = now
end

tokens = math.min(capacity, tokens + rate * (now - last_refill))

local allowed = 0
local retry_after_ms = 0
if tokens >= n then
  allowed = 1
  tokens = tokens - n
else
  retry_after_ms = math.ceil((n - tokens) / rate * 1000)
end

redis.call('HMSET', KEYS[1], 'tokens', tokens, 'last_refill', now)
redis.call('EXPIRE', KEYS[1], ttl)

local reset = math.floor(now) + math.ceil((capacity - tokens) / rate)
return { allowed, math.floor(tokens), reset, retry_after_ms }
"#;

/// `KEYS[1]` = hash key. `ARGV = [capacity, rate_per_sec, n, ttl_secs]`.
pub const LEAKY_BUCKET: &str = r#"
local capacity = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local n = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local t = redis.call('TIME')
local now = tonumber(t[1]) + tonumber(t[2]) / 1e6

local data = redis.call('HMGET', KEYS[1], 'len', 'last_leak')
local len = tonumber(data[1])
local last_leak = tonumber(data[2])
if len == nil then
  len = 0
  last_leak = now
end

local drained = math.floor((now - last_leak) * rate)
if drained > 0 then
  len = math.max(0, len - drained)
  last_leak = last_leak + drained / rate
end

local allowed = 0
local retry_after_ms = 0
if len + n <= capacity then
  allowed = 1
  len = len + n
else
  local overflow = (len + n) - capacity
  retry_after_ms = math.ceil(overflow / rate * 1000)
end

redis.call('HMSET', KEYS[1], 'len', len, 'last_leak', last_leak)
redis.call('EXPIRE', KEYS[1], ttl)

local reset = math.floor(now) + math.ceil(len / rate)
return { allowed, math.floor(capacity - len), reset, retry_after_ms }
"#;

/// `KEYS[1]` = window counter key. `ARGV = [capacity, n, window_secs, window_start, ttl_secs]`.
pub const FIXED_WINDOW: &str = r#"
local capacity = tonumber(ARGV[1])
local n = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local window_start = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])

local count = tonumber(redis.call('GET', KEYS[1]) or '0')
local reset = window_start + window

local allowed = 0
local retry_after_ms = 0
if count + n <= capacity then
  allowed = 1
  count = redis.call('INCRBY', KEYS[1], n)
  redis.call('EXPIRE', KEYS[1], ttl)
else
  local t = redis.call('TIME')
  local now = tonumber(t[1])
  retry_after_ms = math.max(1, (reset - now) * 1000)
end

local remaining = math.max(0, capacity - count)
return { allowed, remaining, reset, retry_after_ms }
"#;

/// `KEYS[1]` = sorted-set key. `ARGV = [capacity, n, window_secs, ttl_secs, seq_seed]`.
pub const SLIDING_LOG: &str = r#"
local capacity = tonumber(ARGV[1])
local n = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])
local seq_seed = tonumber(ARGV[5])

local t = redis.call('TIME')
local now = tonumber(t[1]) + tonumber(t[2]) / 1e6

redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local len = redis.call('ZCARD', KEYS[1])

local allowed = 0
local retry_after_ms = 0
if len + n <= capacity then
  allowed = 1
  for i = 1, n do
    redis.call('ZADD', KEYS[1], now, now .. ':' .. (seq_seed + i))
  end
  len = len + n
  redis.call('EXPIRE', KEYS[1], ttl)
else
  local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
  local oldest_ts = tonumber(oldest[2]) or now
  retry_after_ms = math.max(1, (oldest_ts + window - now) * 1000)
end

local reset
local head = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
if head[2] then
  reset = math.floor(tonumber(head[2]) + window)
else
  reset = math.floor(now)
end

return { allowed, math.max(0, capacity - len), reset, retry_after_ms }
"#;

/// `KEYS[1]` = current-window key, `KEYS[2]` = previous-window key.
/// `ARGV = [capacity, n, window_secs, window_start, prior_current_key, ttl_secs]`.
pub const SLIDING_COUNTER: &str = r#"
local capacity = tonumber(ARGV[1])
local n = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local window_start = tonumber(ARGV[4])
local prior_current_key = ARGV[5]
local ttl = tonumber(ARGV[6])

if redis.call('EXISTS', KEYS[1]) == 0 then
  local last_cur = tonumber(redis.call('GET', prior_current_key) or '0')
  redis.call('SET', KEYS[2], last_cur, 'EX', ttl)
end

local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local previous = tonumber(redis.call('GET', KEYS[2]) or '0')

local t = redis.call('TIME')
local now = tonumber(t[1]) + tonumber(t[2]) / 1e6
local elapsed_frac = (now - window_start) / window
local estimate = previous * (1 - elapsed_frac) + current

local allowed = 0
local retry_after_ms = 0
if estimate + n <= capacity then
  allowed = 1
  current = redis.call('INCRBY', KEYS[1], n)
  redis.call('EXPIRE', KEYS[1], ttl)
  estimate = previous * (1 - elapsed_frac) + current
else
  retry_after_ms = math.max(1, (window_start + window - now) * 1000)
end

local reset = window_start + window
local remaining = math.max(0, capacity - estimate)
return { allowed, math.floor(remaining), reset, retry_after_ms }
"#;
