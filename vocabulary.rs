use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;

/// Name returned for class ids outside the vocabulary.
pub const UNKNOWN_CLASS: &str = "unknown";

/// COCO classes; the index is the detector's class id.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Chinese terms for COCO classes, applied in order.
///
/// "长椅" appears twice (bench, then couch); the later entry wins.
pub const COCO_ZH_ALIASES: &[(&str, &str)] = &[
    ("人", "person"), ("人物", "person"), ("人像", "person"),
    ("自行车", "bicycle"), ("单车", "bicycle"),
    ("汽车", "car"), ("小汽车", "car"), ("轿车", "car"),
    ("摩托车", "motorcycle"), ("电瓶车", "motorcycle"),
    ("飞机", "airplane"), ("航班", "airplane"),
    ("公交车", "bus"), ("巴士", "bus"),
    ("火车", "train"), ("列车", "train"),
    ("卡车", "truck"), ("货车", "truck"),
    ("船", "boat"), ("船只", "boat"),
    ("红绿灯", "traffic light"), ("交通灯", "traffic light"),
    ("消防栓", "fire hydrant"),
    ("停止标志", "stop sign"), ("停车标志", "stop sign"),
    ("停车计时器", "parking meter"),
    ("长椅", "bench"), ("凳子", "bench"),
    ("鸟", "bird"), ("小鸟", "bird"),
    ("猫", "cat"), ("猫咪", "cat"),
    ("狗", "dog"), ("小狗", "dog"),
    ("马", "horse"),
    ("羊", "sheep"), ("绵羊", "sheep"),
    ("牛", "cow"), ("奶牛", "cow"),
    ("大象", "elephant"),
    ("熊", "bear"),
    ("斑马", "zebra"),
    ("长颈鹿", "giraffe"),
    ("背包", "backpack"), ("双肩包", "backpack"),
    ("雨伞", "umbrella"), ("伞", "umbrella"),
    ("手提包", "handbag"), ("手袋", "handbag"),
    ("领带", "tie"),
    ("行李箱", "suitcase"), ("手提箱", "suitcase"),
    ("飞盘", "frisbee"),
    ("滑雪板", "skis"),
    ("滑雪单板", "snowboard"),
    ("球", "sports ball"), ("运动球", "sports ball"),
    ("风筝", "kite"),
    ("棒球棒", "baseball bat"),
    ("棒球手套", "baseball glove"),
    ("滑板", "skateboard"),
    ("冲浪板", "surfboard"),
    ("网球拍", "tennis racket"),
    ("瓶子", "bottle"), ("瓶", "bottle"),
    ("酒杯", "wine glass"), ("玻璃杯", "wine glass"),
    ("杯子", "cup"), ("杯", "cup"), ("水杯", "cup"), ("茶杯", "cup"), ("咖啡杯", "cup"),
    ("叉子", "fork"),
    ("刀", "knife"), ("刀子", "knife"),
    ("勺子", "spoon"),
    ("碗", "bowl"),
    ("香蕉", "banana"),
    ("苹果", "apple"),
    ("三明治", "sandwich"),
    ("橙子", "orange"), ("橘子", "orange"),
    ("西兰花", "broccoli"),
    ("胡萝卜", "carrot"),
    ("热狗", "hot dog"),
    ("披萨", "pizza"),
    ("甜甜圈", "donut"), ("多纳圈", "donut"),
    ("蛋糕", "cake"),
    ("椅子", "chair"),
    ("沙发", "couch"), ("长椅", "couch"),
    ("盆栽", "potted plant"), ("植物", "potted plant"),
    ("床", "bed"),
    ("餐桌", "dining table"), ("桌子", "dining table"),
    ("马桶", "toilet"), ("厕所", "toilet"),
    ("电视", "tv"), ("电视机", "tv"),
    ("笔记本电脑", "laptop"), ("笔记本", "laptop"),
    ("鼠标", "mouse"),
    ("遥控器", "remote"),
    ("键盘", "keyboard"),
    ("手机", "cell phone"), ("电话", "cell phone"),
    ("微波炉", "microwave"),
    ("烤箱", "oven"),
    ("烤面包机", "toaster"),
    ("水槽", "sink"), ("洗手池", "sink"),
    ("冰箱", "refrigerator"),
    ("书", "book"), ("书籍", "book"),
    ("钟", "clock"), ("时钟", "clock"),
    ("花瓶", "vase"),
    ("剪刀", "scissors"),
    ("泰迪熊", "teddy bear"), ("玩具熊", "teddy bear"),
    ("吹风机", "hair drier"), ("电吹风", "hair drier"),
    ("牙刷", "toothbrush"),
];

lazy_static! {
    static ref COCO_VOCABULARY: Arc<Vec<String>> =
        Arc::new(COCO_CLASSES.iter().map(|s| s.to_string()).collect());
    static ref COCO_ALIAS_TABLE: Arc<HashMap<String, String>> = Arc::new(build_alias_table(
        COCO_ZH_ALIASES
            .iter()
            .map(|(alias, class)| (alias.to_string(), class.to_string()))
    ));
}

/// Lowercases keys; a repeated key keeps the last mapping.
fn build_alias_table<I>(pairs: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut table = HashMap::new();
    for (alias, class) in pairs {
        table.insert(alias.trim().to_lowercase(), class);
    }
    table
}

/// Maps user queries onto a fixed, ordered class vocabulary.
///
/// Both tables are shared read-only; clones are cheap.
#[derive(Debug, Clone)]
pub struct ClassNameResolver {
    vocabulary: Arc<Vec<String>>,
    aliases: Arc<HashMap<String, String>>,
}

impl Default for ClassNameResolver {
    fn default() -> Self {
        Self::coco()
    }
}

impl ClassNameResolver {
    pub fn coco() -> Self {
        Self {
            vocabulary: COCO_VOCABULARY.clone(),
            aliases: COCO_ALIAS_TABLE.clone(),
        }
    }

    pub fn new<V, A>(vocabulary: V, aliases: A) -> Self
    where
        V: IntoIterator<Item = String>,
        A: IntoIterator<Item = (String, String)>,
    {
        Self {
            vocabulary: Arc::new(vocabulary.into_iter().collect()),
            aliases: Arc::new(build_alias_table(aliases)),
        }
    }

    /// Layers extra aliases over the current table; later entries win.
    pub fn with_aliases<A>(self, extra: A) -> Self
    where
        A: IntoIterator<Item = (String, String)>,
    {
        let mut table = (*self.aliases).clone();
        table.extend(build_alias_table(extra));
        Self {
            vocabulary: self.vocabulary,
            aliases: Arc::new(table),
        }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Canonical class for `text`: vocabulary hit, then alias, else the lowercased input.
    pub fn resolve(&self, text: &str) -> String {
        let lowered = text.trim().to_lowercase();
        if self.vocabulary.iter().any(|c| *c == lowered) {
            return lowered;
        }
        match self.aliases.get(&lowered) {
            Some(class) => class.clone(),
            None => lowered,
        }
    }

    pub fn class_id_of(&self, class_name: &str) -> Option<i32> {
        self.vocabulary
            .iter()
            .position(|c| c == class_name)
            .map(|idx| idx as i32)
    }

    pub fn name_of(&self, class_id: i32) -> &str {
        usize::try_from(class_id)
            .ok()
            .and_then(|idx| self.vocabulary.get(idx))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CLASS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_english_and_chinese() {
        let resolver = ClassNameResolver::coco();
        assert_eq!(resolver.resolve("cup"), "cup");
        assert_eq!(resolver.resolve("Cup "), "cup");
        assert_eq!(resolver.resolve("杯子"), "cup");
        assert_eq!(resolver.resolve("手机"), "cell phone");
        assert_eq!(resolver.class_id_of(&resolver.resolve("杯子")), Some(41));
    }

    #[test]
    fn unknown_queries_pass_through() {
        let resolver = ClassNameResolver::coco();
        let resolved = resolver.resolve("xyz-nonsense");
        assert_eq!(resolved, "xyz-nonsense");
        assert_eq!(resolver.class_id_of(&resolved), None);
    }

    #[test]
    fn duplicate_alias_keeps_last_mapping() {
        let resolver = ClassNameResolver::coco();
        assert_eq!(resolver.resolve("长椅"), "couch");
        assert_eq!(resolver.resolve("凳子"), "bench");
    }

    #[test]
    fn name_of_is_bounds_checked() {
        let resolver = ClassNameResolver::coco();
        assert_eq!(resolver.name_of(0), "person");
        assert_eq!(resolver.name_of(79), "toothbrush");
        assert_eq!(resolver.name_of(80), UNKNOWN_CLASS);
        assert_eq!(resolver.name_of(-1), UNKNOWN_CLASS);
    }

    #[test]
    fn extra_aliases_override_builtin_ones() {
        let resolver = ClassNameResolver::coco().with_aliases(vec![
            ("Mug".to_string(), "cup".to_string()),
            ("长椅".to_string(), "bench".to_string()),
        ]);
        assert_eq!(resolver.resolve("mug"), "cup");
        assert_eq!(resolver.resolve("长椅"), "bench");
        assert_eq!(resolver.resolve("杯子"), "cup");
    }

    #[test]
    fn custom_vocabulary() {
        let resolver = ClassNameResolver::new(
            vec!["widget".to_string(), "gadget".to_string()],
            vec![("gizmo".to_string(), "gadget".to_string())],
        );
        assert_eq!(resolver.class_id_of(&resolver.resolve("GIZMO")), Some(1));
        assert_eq!(resolver.name_of(2), UNKNOWN_CLASS);
    }
}
