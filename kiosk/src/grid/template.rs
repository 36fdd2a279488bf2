use serde::{Deserialize, Serialize};

use super::error::{GridError, GridResult};

/// 百分比比较的容差
const EPSILON: f64 = 1e-6;

/// 打印纸宽高比
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "4:6")]
    FourBySix,
    #[serde(rename = "2:3")]
    TwoByThree,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Widescreen,
}

impl AspectRatio {
    /// 宽、高
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::FourBySix => (4, 6),
            Self::TwoByThree => (2, 3),
            Self::Square => (1, 1),
            Self::Widescreen => (16, 9),
        }
    }

    /// 显示名称
    pub fn label(&self) -> &'static str {
        match self {
            Self::FourBySix => "4x6 Photo Print",
            Self::TwoByThree => "2x3 Wallet Size",
            Self::Square => "Square (Instagram)",
            Self::Widescreen => "Widescreen",
        }
    }
}

/// 预览样式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewType {
    #[default]
    Grid,
    Strip,
    Collage,
}

/// 照片槽位，坐标和尺寸均为画布百分比（0-100）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSlot {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// 圆角（像素）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
}

impl GridSlot {
    fn check(&self) -> Result<(), String> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !(in_range(self.x) && in_range(self.y)) {
            return Err(format!("slot '{}' origin outside canvas", self.id));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(format!("slot '{}' has empty area", self.id));
        }
        if self.x + self.width > 100.0 + EPSILON || self.y + self.height > 100.0 + EPSILON {
            return Err(format!("slot '{}' extends past canvas", self.id));
        }
        Ok(())
    }
}

/// 模板上的 Logo 位置（百分比）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLogo {
    pub url: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// 打印模板
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridTemplate {
    pub id: String,
    pub name: String,
    /// 需要拍摄的张数
    pub still_count: u32,
    /// 价格（INR）
    pub price: u32,
    pub aspect_ratio: AspectRatio,
    /// 300 DPI 下的画布像素
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub preview_type: PreviewType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<GridLogo>,
    pub slots: Vec<GridSlot>,
    pub is_enabled: bool,
    pub sort_order: i32,
    /// Unix 毫秒时间戳
    pub created_at: i64,
    pub updated_at: i64,
}

impl GridTemplate {
    /// 校验模板
    ///
    /// 槽位必须位于画布内、ID 唯一，且数量等于拍摄张数
    pub fn validate(&self) -> GridResult<()> {
        let invalid = |reason: String| GridError::Invalid {
            id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id is empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty".to_string()));
        }
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(invalid("canvas has zero size".to_string()));
        }
        if self.still_count == 0 {
            return Err(invalid("still count must be at least 1".to_string()));
        }
        if self.slots.len() != self.still_count as usize {
            return Err(invalid(format!(
                "{} slots for {} stills",
                self.slots.len(),
                self.still_count
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for slot in &self.slots {
            if !seen.insert(slot.id.as_str()) {
                return Err(invalid(format!("duplicate slot id '{}'", slot.id)));
            }
            slot.check().map_err(invalid)?;
        }
        Ok(())
    }
}

/// 模板的部分更新
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridTemplateUpdate {
    pub name: Option<String>,
    pub price: Option<u32>,
    pub still_count: Option<u32>,
    pub slots: Option<Vec<GridSlot>>,
    pub background_color: Option<String>,
    pub is_enabled: Option<bool>,
    pub sort_order: Option<i32>,
}

impl GridTemplateUpdate {
    /// 应用到模板（不校验，不修改时间戳）
    pub(crate) fn apply(self, template: &mut GridTemplate) {
        if let Some(name) = self.name {
            template.name = name;
        }
        if let Some(price) = self.price {
            template.price = price;
        }
        if let Some(still_count) = self.still_count {
            template.still_count = still_count;
        }
        if let Some(slots) = self.slots {
            template.slots = slots;
        }
        if let Some(color) = self.background_color {
            template.background_color = Some(color);
        }
        if let Some(enabled) = self.is_enabled {
            template.is_enabled = enabled;
        }
        if let Some(order) = self.sort_order {
            template.sort_order = order;
        }
    }
}

fn slot(id: &str, x: f64, y: f64, width: f64, height: f64, radius: u32) -> GridSlot {
    GridSlot {
        id: id.to_string(),
        x,
        y,
        width,
        height,
        radius: Some(radius),
        z_index: Some(1),
    }
}

fn logo(y: f64, height: f64) -> Option<GridLogo> {
    Some(GridLogo {
        url: "/logo.png".to_string(),
        x: 42.5,
        y,
        width: 15.0,
        height,
    })
}

struct Builtin {
    id: &'static str,
    name: &'static str,
    price: u32,
    aspect_ratio: AspectRatio,
    preview_type: PreviewType,
    background_color: &'static str,
    logo: Option<GridLogo>,
    slots: Vec<GridSlot>,
}

/// 内置模板，首次启动时写入目录
pub fn builtin_templates() -> Vec<GridTemplate> {
    let now = chrono::Utc::now().timestamp_millis();

    let builtins = vec![
        Builtin {
            id: "single_portrait",
            name: "Single Portrait",
            price: 50,
            aspect_ratio: AspectRatio::FourBySix,
            preview_type: PreviewType::Grid,
            background_color: "#ffffff",
            logo: logo(2.0, 8.0),
            slots: vec![slot("s1", 5.0, 10.0, 90.0, 85.0, 16)],
        },
        Builtin {
            id: "single_landscape",
            name: "Single Landscape",
            price: 50,
            aspect_ratio: AspectRatio::TwoByThree,
            preview_type: PreviewType::Grid,
            background_color: "#f8f9fa",
            logo: None,
            slots: vec![slot("s1", 5.0, 25.0, 90.0, 50.0, 12)],
        },
        Builtin {
            id: "split_2_vertical",
            name: "2 Vertical Split",
            price: 70,
            aspect_ratio: AspectRatio::FourBySix,
            preview_type: PreviewType::Grid,
            background_color: "#ffffff",
            logo: logo(2.0, 8.0),
            slots: vec![
                slot("s1", 5.0, 12.0, 42.0, 82.0, 12),
                slot("s2", 53.0, 12.0, 42.0, 82.0, 12),
            ],
        },
        Builtin {
            id: "grid_2x2_classic",
            name: "2×2 Classic",
            price: 100,
            aspect_ratio: AspectRatio::FourBySix,
            preview_type: PreviewType::Grid,
            background_color: "#ffffff",
            logo: logo(2.0, 8.0),
            slots: vec![
                slot("s1", 5.0, 12.0, 42.0, 38.0, 12),
                slot("s2", 53.0, 12.0, 42.0, 38.0, 12),
                slot("s3", 5.0, 56.0, 42.0, 38.0, 12),
                slot("s4", 53.0, 56.0, 42.0, 38.0, 12),
            ],
        },
        Builtin {
            id: "strip_4_vertical",
            name: "Photo Strip",
            price: 80,
            aspect_ratio: AspectRatio::FourBySix,
            preview_type: PreviewType::Strip,
            background_color: "#ffffff",
            logo: logo(1.0, 5.0),
            slots: vec![
                slot("s1", 10.0, 8.0, 80.0, 19.0, 8),
                slot("s2", 10.0, 30.0, 80.0, 19.0, 8),
                slot("s3", 10.0, 52.0, 80.0, 19.0, 8),
                slot("s4", 10.0, 74.0, 80.0, 19.0, 8),
            ],
        },
        Builtin {
            id: "grid_3x2",
            name: "3×2 Grid",
            price: 120,
            aspect_ratio: AspectRatio::FourBySix,
            preview_type: PreviewType::Grid,
            background_color: "#ffffff",
            logo: logo(1.0, 5.0),
            slots: vec![
                slot("s1", 5.0, 8.0, 28.0, 26.0, 8),
                slot("s2", 36.0, 8.0, 28.0, 26.0, 8),
                slot("s3", 67.0, 8.0, 28.0, 26.0, 8),
                slot("s4", 5.0, 37.0, 28.0, 26.0, 8),
                slot("s5", 36.0, 37.0, 28.0, 26.0, 8),
                slot("s6", 67.0, 37.0, 28.0, 26.0, 8),
            ],
        },
    ];

    builtins
        .into_iter()
        .enumerate()
        .map(|(index, b)| GridTemplate {
            id: b.id.to_string(),
            name: b.name.to_string(),
            still_count: b.slots.len() as u32,
            price: b.price,
            aspect_ratio: b.aspect_ratio,
            canvas_width: 1200,
            canvas_height: 1800,
            preview_type: b.preview_type,
            background_color: Some(b.background_color.to_string()),
            background_image: None,
            logo: b.logo,
            slots: b.slots,
            is_enabled: true,
            sort_order: index as i32 + 1,
            created_at: now,
            updated_at: now,
        })
        .collect()
}
