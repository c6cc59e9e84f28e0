use serde::{Deserialize, Serialize};

use stockpulse_core::ShopId;
use stockpulse_inventory::{ItemKey, TrackedItem};

use crate::cadence::{AlertKind, BatchCycle};

/// One low-stock item as shown to the recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLine {
    pub key: ItemKey,
    pub display_name: String,
    pub product_title: String,
    pub variant_title: Option<String>,
    pub current_inventory: i64,
    pub threshold_quantity: i64,
}

impl From<&TrackedItem> for AlertLine {
    fn from(item: &TrackedItem) -> Self {
        Self {
            key: item.key().clone(),
            display_name: item.display_name(),
            product_title: item.product_title().to_string(),
            variant_title: item.variant_title().map(str::to_string),
            current_inventory: item.current_inventory(),
            threshold_quantity: item.threshold_quantity(),
        }
    }
}

/// What gets handed to the delivery capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertPayload {
    Single {
        shop_id: ShopId,
        line: AlertLine,
    },
    Batch {
        shop_id: ShopId,
        cycle: BatchCycle,
        lines: Vec<AlertLine>,
    },
}

impl AlertPayload {
    pub fn single(item: &TrackedItem) -> Self {
        Self::Single {
            shop_id: item.shop_id().clone(),
            line: AlertLine::from(item),
        }
    }

    pub fn batch<'a>(
        shop_id: ShopId,
        cycle: BatchCycle,
        items: impl IntoIterator<Item = &'a TrackedItem>,
    ) -> Self {
        Self::Batch {
            shop_id,
            cycle,
            lines: items.into_iter().map(AlertLine::from).collect(),
        }
    }

    pub fn shop_id(&self) -> &ShopId {
        match self {
            Self::Single { shop_id, .. } | Self::Batch { shop_id, .. } => shop_id,
        }
    }

    pub fn kind(&self) -> AlertKind {
        match self {
            Self::Single { .. } => AlertKind::Instant,
            Self::Batch { cycle, .. } => cycle.alert_kind(),
        }
    }

    pub fn subject(&self) -> &'static str {
        self.kind().subject()
    }

    pub fn lines(&self) -> &[AlertLine] {
        match self {
            Self::Single { line, .. } => std::slice::from_ref(line),
            Self::Batch { lines, .. } => lines,
        }
    }
}
