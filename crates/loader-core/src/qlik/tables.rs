/// The set of CUBIC ODS tables this loader actively mirrors.
///
/// Grounded on `qlik.ods_tables.CUBIC_ODS_TABLES`; tables the original
/// leaves commented out (pending a downstream view, known to be slow, or
/// without associated data) are omitted here entirely rather than carried
/// as dead entries.
pub const CUBIC_ODS_TABLES: &[&str] = &[
    "EDW.FARE_PROD_USERS_LIST_DIMENSION",
    "EDW.FARE_PRODUCT_DIMENSION",
    "EDW.MEDIA_TYPE_DIMENSION",
    "EDW.OPERATOR_DIMENSION",
    "EDW.RIDE_TYPE_DIMENSION",
    "EDW.ROUTE_DIMENSION",
    "EDW.TRANSIT_ACCOUNT_DIMENSION",
    "EDW.TXN_STATUS_DIMENSION",
    "EDW.CARD_DIMENSION",
    "EDW.USE_TRANSACTION",
    "EDW.TXN_CHANNEL_MAP",
    "EDW.CCH_AFC_TRANSACTION",
    "EDW.PAYMENT_TYPE_DIMENSION",
    "EDW.FNP_GENERAL_JRNL_ACCOUNT_ENTRY",
    "EDW.PAYMENT_SUMMARY",
    "EDW.DEVICE_EVENT",
    "EDW.ABP_TAP",
    "CCH_STAGE.CATEGORY",
    "EDW.BUSINESS_ENTITY_DIMENSION",
    "EDW.SALE_TYPE_DIMENSION",
    "CCH_STAGE.REPROCESS_ACTION",
    "EDW.CREDIT_CARD_TYPE_DIMENSION",
    "EDW.TRANSACTION_ORIGIN_DIMENSION",
    "CCH_STAGE.CATEGORIZATION_RULE",
    "CCH_STAGE.TRANSACTION_TYPE",
    "EDW.RIDER_CLASS_DIMENSION",
    "EDW.PURSE_TYPE_DIMENSION",
    "EDW.MEMBER_DIMENSION",
    "EDW.FAREREV_RECOVERY_TXN",
    "EDW.REASON_DIMENSION",
    "EDW.SVN_TASK",
];
