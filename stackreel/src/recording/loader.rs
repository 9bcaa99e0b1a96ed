//! Module lifecycle tracking.
//!
//! Two sources feed the event log: a one-shot enumeration of everything the
//! loader has already mapped when the recorder bootstraps, and the ntdll
//! DLL-notification callback for loads and unloads after that. The
//! notification entry points are real but undocumented, so they are resolved
//! from ntdll by name at registration time; when they cannot be found the
//! recorder degrades to startup enumeration only.
//!
//! The enumeration-then-subscribe sequence can race a concurrent load, which
//! at worst duplicates an `add_module` record; the player's module map
//! treats an overlapping re-add as a replacement, so duplicates are benign.

/// One already-loaded module reported by startup enumeration.
#[derive(Debug, Clone)]
pub struct EnumeratedModule {
    pub path: Vec<u16>,
    pub base: u64,
    pub size: u32,
}

#[cfg(windows)]
pub use self::windows::{enumerate_modules, LoaderHook};

#[cfg(not(windows))]
pub use self::fallback::{enumerate_modules, LoaderHook};

#[cfg(windows)]
mod windows {
    use std::mem;
    use std::ptr;
    use std::slice;

    use winapi::shared::minwindef::{DWORD, HMODULE};
    use winapi::shared::ntdef::{NTSTATUS, PVOID, ULONG, UNICODE_STRING};
    use winapi::um::libloaderapi::{GetModuleHandleA, GetProcAddress};
    use winapi::um::processthreadsapi::GetCurrentProcess;
    use winapi::um::psapi::{
        EnumProcessModulesEx, GetModuleFileNameExW, GetModuleInformation, LIST_MODULES_ALL,
        MODULEINFO,
    };

    use stackreel_common::MAX_PATH_UNITS;

    use super::EnumeratedModule;

    const LDR_DLL_NOTIFICATION_REASON_LOADED: ULONG = 1;
    const LDR_DLL_NOTIFICATION_REASON_UNLOADED: ULONG = 2;

    /// Payload of a loader notification. The loaded and unloaded shapes are
    /// identical, so one struct stands in for ntdll's union of the two.
    #[repr(C)]
    struct LdrDllNotificationData {
        flags: ULONG,
        full_dll_name: *const UNICODE_STRING,
        base_dll_name: *const UNICODE_STRING,
        dll_base: PVOID,
        size_of_image: ULONG,
    }

    type LdrNotificationFunction =
        unsafe extern "system" fn(ULONG, *const LdrDllNotificationData, PVOID);
    type LdrRegisterFn =
        unsafe extern "system" fn(ULONG, LdrNotificationFunction, PVOID, *mut PVOID) -> NTSTATUS;
    type LdrUnregisterFn = unsafe extern "system" fn(PVOID) -> NTSTATUS;

    /// A registered loader-notification callback, identified by the opaque
    /// cookie ntdll hands back.
    pub struct LoaderHook {
        cookie: PVOID,
        unregister: LdrUnregisterFn,
    }

    // The cookie is an opaque token; it is only ever handed back to
    // LdrUnregisterDllNotification.
    unsafe impl Send for LoaderHook {}

    impl LoaderHook {
        /// Register the process-wide notification callback. `None` when the
        /// ntdll entry points cannot be resolved or registration fails.
        pub fn register() -> Option<LoaderHook> {
            unsafe {
                let ntdll = GetModuleHandleA(b"ntdll.dll\0".as_ptr().cast());
                if ntdll.is_null() {
                    return None;
                }
                let reg = GetProcAddress(ntdll, b"LdrRegisterDllNotification\0".as_ptr().cast());
                let unreg =
                    GetProcAddress(ntdll, b"LdrUnregisterDllNotification\0".as_ptr().cast());
                if reg.is_null() || unreg.is_null() {
                    return None;
                }
                let reg: LdrRegisterFn = mem::transmute(reg);
                let unregister: LdrUnregisterFn = mem::transmute(unreg);

                let mut cookie: PVOID = ptr::null_mut();
                if reg(0, notification_callback, ptr::null_mut(), &mut cookie) != 0 {
                    return None;
                }
                Some(LoaderHook { cookie, unregister })
            }
        }

        /// Unregister the callback. Blocks until in-flight notifications
        /// drain, so this must never run while the recorder lock is held:
        /// a notification waiting on that lock would deadlock with us.
        pub fn unregister(self) {
            unsafe {
                (self.unregister)(self.cookie);
            }
        }
    }

    /// Runs on whichever thread the loader is mapping or unmapping a module.
    /// Forwards straight into the recorder, which appends without
    /// allocating.
    unsafe extern "system" fn notification_callback(
        reason: ULONG,
        data: *const LdrDllNotificationData,
        _context: PVOID,
    ) {
        if data.is_null() {
            return;
        }
        let data = &*data;
        if data.full_dll_name.is_null() {
            return;
        }
        let name = &*data.full_dll_name;
        // UNICODE_STRING::Length is in bytes, not code units.
        let units = slice::from_raw_parts(name.Buffer, usize::from(name.Length) / 2);

        let recorder = crate::recording::recorder();
        match reason {
            LDR_DLL_NOTIFICATION_REASON_LOADED => {
                recorder.on_module_loaded(units, data.dll_base as u64, data.size_of_image);
            }
            LDR_DLL_NOTIFICATION_REASON_UNLOADED => {
                recorder.on_module_unloaded(units);
            }
            _ => {}
        }
    }

    /// Enumerate every module currently mapped into this process. Modules
    /// whose metadata cannot be read are skipped; partial results are still
    /// worth recording.
    pub fn enumerate_modules() -> Vec<EnumeratedModule> {
        unsafe {
            let process = GetCurrentProcess();

            let mut needed: DWORD = 0;
            if EnumProcessModulesEx(process, ptr::null_mut(), 0, &mut needed, LIST_MODULES_ALL)
                == 0
            {
                return Vec::new();
            }

            let mut handles: Vec<HMODULE> =
                vec![ptr::null_mut(); needed as usize / mem::size_of::<HMODULE>()];
            let bytes = (handles.len() * mem::size_of::<HMODULE>()) as DWORD;
            if EnumProcessModulesEx(process, handles.as_mut_ptr(), bytes, &mut needed, LIST_MODULES_ALL) == 0 {
                return Vec::new();
            }
            // A module may have been unloaded between the two calls.
            let returned = (needed as usize / mem::size_of::<HMODULE>()).min(handles.len());
            handles.truncate(returned);

            let mut modules = Vec::with_capacity(handles.len());
            let mut path = [0u16; MAX_PATH_UNITS];
            for module in handles {
                let mut info: MODULEINFO = mem::zeroed();
                if GetModuleInformation(
                    process,
                    module,
                    &mut info,
                    mem::size_of::<MODULEINFO>() as DWORD,
                ) == 0
                {
                    continue;
                }
                let len =
                    GetModuleFileNameExW(process, module, path.as_mut_ptr(), MAX_PATH_UNITS as DWORD)
                        as usize;
                if len == 0 {
                    continue;
                }
                modules.push(EnumeratedModule {
                    path: path[..len].to_vec(),
                    base: info.lpBaseOfDll as u64,
                    size: info.SizeOfImage,
                });
            }
            modules
        }
    }
}

#[cfg(not(windows))]
mod fallback {
    use super::EnumeratedModule;

    /// Stand-in for hosts without the Windows loader: behaves exactly like
    /// the degraded no-notification mode.
    pub struct LoaderHook;

    impl LoaderHook {
        pub fn register() -> Option<LoaderHook> {
            None
        }

        pub fn unregister(self) {}
    }

    pub fn enumerate_modules() -> Vec<EnumeratedModule> {
        Vec::new()
    }
}
