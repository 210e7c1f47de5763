use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::errors::{KeeperError, KeeperResult};

/// 时间点匹配使用的分钟级格式
pub const MINUTE_FORMAT: &str = "%H:%M";

/// 触发器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    /// 每隔固定秒数触发
    TimeInterval,
    /// 在指定的时间点触发
    SpecificTime,
}

/// 任务触发器
///
/// `kind` 决定使用哪一份配置：`TimeInterval` 读取 `time_interval`，
/// `SpecificTime` 读取 `specific_time`。类型与配置不一致的触发器在
/// [`TaskTrigger::validate`] 中被拒绝。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTrigger {
    pub kind: TriggerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_interval: Option<TimeInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_time: Option<SpecificTime>,
}

impl TaskTrigger {
    pub fn interval(time_interval: TimeInterval) -> Self {
        Self {
            kind: TriggerKind::TimeInterval,
            time_interval: Some(time_interval),
            specific_time: None,
        }
    }

    pub fn specific(specific_time: SpecificTime) -> Self {
        Self {
            kind: TriggerKind::SpecificTime,
            time_interval: None,
            specific_time: Some(specific_time),
        }
    }

    /// 校验触发器配置是否完整
    pub fn validate(&self) -> KeeperResult<()> {
        match self.kind {
            TriggerKind::TimeInterval => {
                let interval = self.time_interval.as_ref().ok_or_else(|| {
                    KeeperError::Configuration("TimeInterval 触发器缺少间隔配置".to_string())
                })?;
                if interval.interval_seconds == 0 {
                    return Err(KeeperError::Configuration(
                        "触发间隔必须大于0秒".to_string(),
                    ));
                }
                Ok(())
            }
            TriggerKind::SpecificTime => {
                let specific = self.specific_time.as_ref().ok_or_else(|| {
                    KeeperError::Configuration("SpecificTime 触发器缺少指定时间配置".to_string())
                })?;
                specific.validate()
            }
        }
    }

    /// 判断给定时刻是否应当触发
    ///
    /// 配置缺失的触发器永远不会触发；调用方应在注册前先调用 `validate`。
    pub fn should_trigger(&self, now: NaiveDateTime) -> bool {
        match self.kind {
            TriggerKind::TimeInterval => self
                .time_interval
                .as_ref()
                .is_some_and(|interval| interval.should_trigger(now)),
            TriggerKind::SpecificTime => self
                .specific_time
                .as_ref()
                .is_some_and(|specific| specific.should_trigger(now)),
        }
    }
}

/// 每隔一段时间触发，支持在部分时间段内不触发
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub interval_seconds: u64,
    #[serde(default)]
    pub exclusions: Vec<TimeSpanRange>,
}

impl TimeInterval {
    pub fn new(interval_seconds: u64) -> Self {
        Self {
            interval_seconds,
            exclusions: Vec::new(),
        }
    }

    pub fn with_exclusion(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.exclusions.push(TimeSpanRange { start, end });
        self
    }

    pub fn should_trigger(&self, now: NaiveDateTime) -> bool {
        let time_of_day = now.time();
        !self
            .exclusions
            .iter()
            .any(|range| range.contains(time_of_day))
    }
}

/// 一天之内的时间范围，两端均包含
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpanRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSpanRange {
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && time <= self.end
    }
}

/// 在特定的时间触发，任意一条子规则完全匹配即触发
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly: Option<MonthlyRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly: Option<WeeklyRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily: Option<DailyRule>,
}

impl SpecificTime {
    pub fn should_trigger(&self, now: NaiveDateTime) -> bool {
        self.monthly.as_ref().is_some_and(|rule| rule.matches(now))
            || self.weekly.as_ref().is_some_and(|rule| rule.matches(now))
            || self.daily.as_ref().is_some_and(|rule| rule.matches(now))
    }

    fn validate(&self) -> KeeperResult<()> {
        if self.monthly.is_none() && self.weekly.is_none() && self.daily.is_none() {
            return Err(KeeperError::Configuration(
                "SpecificTime 触发器至少需要一条月/周/日规则".to_string(),
            ));
        }

        if let Some(rule) = &self.monthly {
            check_range("month_of_year", &rule.month_of_year, 1, 12)?;
            check_range("day_of_month", &rule.day_of_month, 1, 31)?;
            check_times(&rule.times)?;
        }
        if let Some(rule) = &self.weekly {
            check_range("week_of_month", &rule.week_of_month, 1, 5)?;
            check_range("day_of_week", &rule.day_of_week, 0, 6)?;
            check_times(&rule.times)?;
        }
        if let Some(rule) = &self.daily {
            check_range("day_of_week", &rule.day_of_week, 0, 6)?;
            check_times(&rule.times)?;
        }
        Ok(())
    }
}

/// 按月匹配：月份(1-12)、日期(1-31)、时间(HH:mm)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRule {
    #[serde(default)]
    pub month_of_year: Vec<u32>,
    #[serde(default)]
    pub day_of_month: Vec<u32>,
    #[serde(default)]
    pub times: Vec<String>,
}

impl MonthlyRule {
    pub fn matches(&self, now: NaiveDateTime) -> bool {
        accepts(&self.month_of_year, &now.month())
            && accepts(&self.day_of_month, &now.day())
            && accepts_time(&self.times, now)
    }
}

/// 按周匹配：月内第几周(1-5)、星期几(0=周日..6=周六)、时间(HH:mm)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyRule {
    #[serde(default)]
    pub week_of_month: Vec<u32>,
    #[serde(default)]
    pub day_of_week: Vec<u32>,
    #[serde(default)]
    pub times: Vec<String>,
}

impl WeeklyRule {
    pub fn matches(&self, now: NaiveDateTime) -> bool {
        accepts(&self.week_of_month, &week_of_month(now))
            && accepts(&self.day_of_week, &day_of_week(now))
            && accepts_time(&self.times, now)
    }
}

/// 按日匹配：星期几(0=周日..6=周六)、时间(HH:mm)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRule {
    #[serde(default)]
    pub day_of_week: Vec<u32>,
    #[serde(default)]
    pub times: Vec<String>,
}

impl DailyRule {
    pub fn matches(&self, now: NaiveDateTime) -> bool {
        accepts(&self.day_of_week, &day_of_week(now)) && accepts_time(&self.times, now)
    }
}

/// 月内第几周，从1开始：1-7日为第1周
pub fn week_of_month(now: NaiveDateTime) -> u32 {
    (now.day() - 1) / 7 + 1
}

/// 星期几，0表示周日
pub fn day_of_week(now: NaiveDateTime) -> u32 {
    now.weekday().num_days_from_sunday()
}

// 空列表表示该维度不做限制
fn accepts(allowed: &[u32], value: &u32) -> bool {
    allowed.is_empty() || allowed.contains(value)
}

fn accepts_time(times: &[String], now: NaiveDateTime) -> bool {
    if times.is_empty() {
        return true;
    }
    let minute = format!("{:02}:{:02}", now.hour(), now.minute());
    times.iter().any(|t| *t == minute)
}

fn check_range(axis: &str, values: &[u32], min: u32, max: u32) -> KeeperResult<()> {
    match values.iter().find(|v| **v < min || **v > max) {
        Some(value) => Err(KeeperError::Configuration(format!(
            "{axis} 取值 {value} 超出范围 {min}-{max}"
        ))),
        None => Ok(()),
    }
}

fn check_times(times: &[String]) -> KeeperResult<()> {
    for time in times {
        let parsed = NaiveTime::parse_from_str(time, MINUTE_FORMAT).map_err(|e| {
            KeeperError::Configuration(format!("无效的时间格式 '{time}'，应为 HH:mm: {e}"))
        })?;
        if parsed.format(MINUTE_FORMAT).to_string() != *time {
            return Err(KeeperError::Configuration(format!(
                "无效的时间格式 '{time}'，应为两位数的 HH:mm"
            )));
        }
    }
    Ok(())
}
