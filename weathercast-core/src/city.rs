//! Canonical query names for the weather provider.
//!
//! Only exact, case-sensitive matches against the table are rewritten.
//! Anything else is passed through untouched.

const CITY_TABLE: &[(&str, &str)] = &[
    ("北京", "Beijing"),
    ("上海", "Shanghai"),
    ("广州", "Guangzhou"),
    ("深圳", "Shenzhen"),
    ("杭州", "Hangzhou"),
    ("南京", "Nanjing"),
    ("武汉", "Wuhan"),
    ("成都", "Chengdu"),
    ("西安", "Xian"),
    ("重庆", "Chongqing"),
    ("天津", "Tianjin"),
    ("青岛", "Qingdao"),
    ("大连", "Dalian"),
    ("厦门", "Xiamen"),
    ("苏州", "Suzhou"),
    ("无锡", "Wuxi"),
    ("宁波", "Ningbo"),
    ("长沙", "Changsha"),
    ("郑州", "Zhengzhou"),
    ("济南", "Jinan"),
    ("沈阳", "Shenyang"),
    ("哈尔滨", "Harbin"),
    ("长春", "Changchun"),
    ("石家庄", "Shijiazhuang"),
];

/// Map a place name to the query string sent to the provider.
pub fn normalize(input: &str) -> &str {
    CITY_TABLE
        .iter()
        .find(|(name, _)| *name == input)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(input)
}
