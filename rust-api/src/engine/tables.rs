//! Fixed reference tables for grades and venues

/// Relative strength of a race grade
pub fn grade_strength(grade: &str) -> Option<f64> {
    match grade.trim() {
        "SG" => Some(1.25),
        "G1" => Some(1.18),
        "G2" => Some(1.12),
        "G3" => Some(1.06),
        "一般" => Some(1.00),
        _ => None,
    }
}

/// Stadium code to name mapping
pub fn stadium_name(code: u8) -> Option<&'static str> {
    let name = match code {
        1 => "桐生",
        2 => "戸田",
        3 => "江戸川",
        4 => "平和島",
        5 => "多摩川",
        6 => "浜名湖",
        7 => "蒲郡",
        8 => "常滑",
        9 => "津",
        10 => "三国",
        11 => "びわこ",
        12 => "住之江",
        13 => "尼崎",
        14 => "鳴門",
        15 => "丸亀",
        16 => "児島",
        17 => "宮島",
        18 => "徳山",
        19 => "下関",
        20 => "若松",
        21 => "芦屋",
        22 => "福岡",
        23 => "唐津",
        24 => "大村",
        _ => return None,
    };
    Some(name)
}

/// Branch whose racers are local to a venue
pub fn venue_branch(venue: &str) -> Option<&'static str> {
    let branch = match venue {
        "桐生" => "群馬",
        "戸田" => "埼玉",
        "江戸川" | "平和島" | "多摩川" => "東京",
        "浜名湖" => "静岡",
        "蒲郡" | "常滑" => "愛知",
        "津" => "三重",
        "三国" => "福井",
        "びわこ" => "滋賀",
        "住之江" => "大阪",
        "尼崎" => "兵庫",
        "鳴門" => "徳島",
        "丸亀" => "香川",
        "児島" => "岡山",
        "宮島" => "広島",
        "徳山" | "下関" => "山口",
        "若松" | "芦屋" | "福岡" => "福岡",
        "唐津" => "佐賀",
        "大村" => "長崎",
        _ => return None,
    };
    Some(branch)
}

/// Expected branch for a venue given by name or stadium code
pub fn expected_branch(venue: &str) -> Option<&'static str> {
    let venue = venue.trim();
    match venue.parse::<u8>() {
        Ok(code) => stadium_name(code).and_then(venue_branch),
        Err(_) => venue_branch(venue),
    }
}
