use crate::dialogue::states::DialogueReply;
use crate::pricing::{format_amount, format_with_precision, CostEstimate};

/// Renders reply intents into the Thai-language texts shown in chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyCatalog {
    trigger_phrase: String,
    affirmative_reply: String,
    currency_label: String,
}

impl ReplyCatalog {
    pub fn new(
        trigger_phrase: impl Into<String>,
        affirmative_reply: impl Into<String>,
        currency_label: impl Into<String>,
    ) -> Self {
        Self {
            trigger_phrase: trigger_phrase.into(),
            affirmative_reply: affirmative_reply.into(),
            currency_label: currency_label.into(),
        }
    }

    pub fn render(&self, reply: &DialogueReply) -> String {
        match reply {
            DialogueReply::NoActiveSession => {
                format!("⚠️ กรุณาเริ่มคำนวณใหม่โดยพิมพ์ '{}'", self.trigger_phrase)
            }
            DialogueReply::MaterialPrompt { materials } => {
                format!("กรุณาเลือกวัสดุที่ต้องการผลิต:\n{}", materials.join(", "))
            }
            DialogueReply::InvalidMaterial { materials } => format!(
                "❌ วัสดุไม่ถูกต้อง กรุณาเลือกจากรายการที่ให้ไว้:\n{}",
                materials.join(", ")
            ),
            DialogueReply::DimensionsPrompt => {
                "กรุณากรอกขนาดชิ้นงาน (กว้างxยาวxสูง) cm เช่น 10.5x15.5x5.5".to_owned()
            }
            DialogueReply::InvalidDimensions => {
                "❌ รูปแบบขนาดไม่ถูกต้อง กรุณากรอกใหม่ เช่น 10.5x15.5x5.5".to_owned()
            }
            DialogueReply::QuantityPrompt => "กรุณากรอกจำนวนที่ต้องการผลิต (ตัวเลข)".to_owned(),
            DialogueReply::InvalidQuantity => "❌ กรุณากรอกจำนวนที่ถูกต้อง เช่น 100".to_owned(),
            DialogueReply::Summary { estimate } => self.summary(estimate),
            DialogueReply::ConfirmationReprompt => {
                format!("❌ โปรดพิมพ์ '{}' หากต้องการขอใบเสนอราคา", self.affirmative_reply)
            }
            DialogueReply::ContactPrompt => {
                "📇 กรุณากรอกข้อมูลติดต่อในรูปแบบ: ชื่อ, เบอร์โทร, อีเมล\n\
                 เช่น สมชาย ใจดี, 0812345678, somchai@example.com"
                    .to_owned()
            }
            DialogueReply::InvalidContact => {
                "❌ รูปแบบข้อมูลติดต่อไม่ถูกต้อง กรุณากรอก ชื่อ, เบอร์โทร, อีเมล \
                 คั่นด้วยเครื่องหมายจุลภาค"
                    .to_owned()
            }
            DialogueReply::Completed => {
                "✅ ข้อมูลของคุณถูกบันทึกเรียบร้อยแล้ว! ขอบคุณที่ใช้บริการ 😊".to_owned()
            }
            DialogueReply::Cancelled => {
                format!("🛑 ยกเลิกการคำนวณแล้ว พิมพ์ '{}' เพื่อเริ่มใหม่", self.trigger_phrase)
            }
            DialogueReply::PersistenceFailed => {
                "⚠️ ขออภัย ระบบไม่สามารถบันทึกข้อมูลได้ในขณะนี้ กรุณาติดต่อเจ้าหน้าที่".to_owned()
            }
            DialogueReply::Unavailable => {
                "⚠️ ขออภัย ระบบขัดข้องชั่วคราว กรุณาลองใหม่อีกครั้ง".to_owned()
            }
        }
    }

    fn summary(&self, estimate: &CostEstimate) -> String {
        format!(
            "📊 ผลการคำนวณ\n\
             วัสดุ: {material}\n\
             ขนาด: {size} cm\n\
             ปริมาตร: {volume} cm³\n\
             น้ำหนักต่อชิ้น: {weight} kg\n\
             จำนวน: {quantity} ชิ้น\n\
             💰 ราคาประมาณการ: {total} {currency}\n\n\
             ❓ คุณต้องการขอใบเสนอราคาหรือไม่? (พิมพ์ '{affirmative}' เพื่อยืนยัน)",
            material = estimate.material.name,
            size = estimate.dimensions.descriptor(),
            volume = format_amount(estimate.volume_cm3),
            weight = format_with_precision(estimate.weight_kg, 3),
            quantity = format_with_precision(f64::from(estimate.quantity), 0),
            total = format_amount(estimate.total_cost),
            currency = self.currency_label,
            affirmative = self.affirmative_reply,
        )
    }
}

impl Default for ReplyCatalog {
    fn default() -> Self {
        Self::new(crate::dialogue::engine::DEFAULT_TRIGGER_PHRASE, "ใช่", "บาท")
    }
}
