#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RawArgCommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub key: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[RawArgCommandSpec] = &[
    RawArgCommandSpec {
        command: "product",
        action: "set_product",
        key: "product",
    },
    RawArgCommandSpec {
        command: "color",
        action: "set_color",
        key: "color",
    },
    RawArgCommandSpec {
        command: "use",
        action: "set_current_image",
        key: "image_id",
    },
    RawArgCommandSpec {
        command: "new",
        action: "new_chat",
        key: "title",
    },
    RawArgCommandSpec {
        command: "switch",
        action: "switch_chat",
        key: "chat_id",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload",
    },
    CommandSpec {
        command: "preview",
        action: "preview",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "images",
        action: "list_images",
    },
    CommandSpec {
        command: "history",
        action: "history",
    },
    CommandSpec {
        command: "products",
        action: "list_products",
    },
    CommandSpec {
        command: "video",
        action: "video",
    },
    CommandSpec {
        command: "chats",
        action: "list_chats",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/upload",
    "/use",
    "/images",
    "/history",
    "/product",
    "/products",
    "/color",
    "/preview",
    "/video",
    "/new",
    "/chats",
    "/switch",
    "/help",
];
